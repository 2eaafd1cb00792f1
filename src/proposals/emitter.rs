//! Append-only proposal audit writer, secret redaction, and the in-memory
//! (process-local, best-effort) supersede/expire lifecycle.

use super::models::{OrderProposal, ProposalStatus};
use super::validator::{validate_proposal, AgentMode, ProposalValidationError};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const SECRET_KEYS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "access_token",
    "refresh_token",
    "secret",
    "client_secret",
    "password",
    "passwd",
    "private_key",
    "authorization",
];
const SECRET_SUBSTRINGS: &[&str] = &["secret", "token", "password", "key", "credential", "private"];

/// Recursively redacts any object key that exactly matches, or contains as
/// a substring, a known secret-shaped name. Arrays recurse element-wise.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let lower = k.trim().to_ascii_lowercase();
                let is_secret = SECRET_KEYS.contains(&lower.as_str())
                    || SECRET_SUBSTRINGS.iter().any(|s| lower.contains(s));
                out.insert(
                    k.clone(),
                    if is_secret {
                        Value::String("***REDACTED***".to_string())
                    } else {
                        redact(v)
                    },
                );
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn audit_root() -> PathBuf {
    std::env::var("AUDIT_ARTIFACTS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("audit_artifacts"))
}

fn proposal_audit_path(now: DateTime<Utc>) -> PathBuf {
    audit_root()
        .join("proposals")
        .join(now.format("%Y-%m-%d").to_string())
        .join("proposals.ndjson")
}

fn intent_log(intent_type: &str, severity: &str, mut fields: Value) {
    let log_ts = Utc::now().to_rfc3339();
    let mut line = json!({
        "event_type": "intent",
        "intent_type": intent_type,
        "severity": severity,
        "log_ts": log_ts,
        "ts": log_ts,
    });
    if let (Some(line_obj), Some(extra_obj)) = (line.as_object_mut(), fields.as_object_mut()) {
        for (k, v) in extra_obj.drain(..) {
            line_obj.insert(k, v);
        }
    }
    println!("{line}");
}

/// Process-local, best-effort lifecycle: marks prior proposals for the
/// same `(strategy, symbol, contract_key)` as superseded within a window,
/// and expires proposals whose `valid_until_utc` has passed. Never
/// persisted — a restart loses this bookkeeping, by design (see
/// `SPEC_FULL.md` §9): the audit NDJSON is the durable record.
pub struct ProposalLifecycle {
    supersede_window: chrono::Duration,
    live: HashMap<(String, String, String), (uuid::Uuid, DateTime<Utc>)>,
}

impl ProposalLifecycle {
    pub fn new(supersede_window_s: u64) -> Self {
        Self {
            supersede_window: chrono::Duration::seconds(supersede_window_s as i64),
            live: HashMap::new(),
        }
    }

    /// Registers `proposal` as the latest for its lifecycle key. Returns
    /// the id of a prior proposal that should now be marked SUPERSEDED, if
    /// one existed within the supersede window.
    pub fn register(&mut self, proposal: &OrderProposal, now: DateTime<Utc>) -> Option<uuid::Uuid> {
        let key = proposal.lifecycle_key();
        let superseded = self.live.get(&key).and_then(|(id, registered_at)| {
            if now - *registered_at <= self.supersede_window {
                Some(*id)
            } else {
                None
            }
        });
        self.live.insert(key, (proposal.proposal_id, now));
        if let Some(id) = superseded {
            info!(proposal_id = %id, "proposal superseded");
        }
        superseded
    }
}

pub struct EmitOutcome {
    pub proposal: OrderProposal,
    pub written: bool,
}

/// Validates, logs, registers in the lifecycle, and appends the proposal
/// to the date-partitioned audit log. Validation failures log a
/// `rejected` intent and never touch the filesystem. Filesystem failures
/// fall back to an `order_proposal_fallback` intent log line rather than
/// losing the proposal.
pub async fn emit_proposal(
    proposal: &OrderProposal,
    agent_mode: AgentMode,
    symbol_allowlist: Option<&[String]>,
    lifecycle: &mut ProposalLifecycle,
    now: Option<DateTime<Utc>>,
) -> Result<EmitOutcome, ProposalValidationError> {
    let now = now.unwrap_or_else(Utc::now);
    let normalized = match validate_proposal(proposal, agent_mode, symbol_allowlist, Some(now)) {
        Ok(p) => p,
        Err(e) => {
            intent_log(
                "rejected",
                "WARN",
                json!({"proposal_id": proposal.proposal_id, "errors": e.errors}),
            );
            return Err(e);
        }
    };

    intent_log(
        "proposed",
        "INFO",
        json!({
            "proposal_id": normalized.proposal_id,
            "symbol": normalized.symbol,
            "strategy_name": normalized.strategy_name,
        }),
    );

    lifecycle.register(&normalized, now);

    let mut redacted = serde_json::to_value(&normalized).expect("proposal always serializes");
    if let Some(rationale) = redacted.get_mut("rationale") {
        if let Some(indicators) = rationale.get("indicators").cloned() {
            if let Some(obj) = rationale.as_object_mut() {
                obj.insert("indicators".to_string(), redact(&indicators));
            }
        }
    }

    let path = proposal_audit_path(now);
    let written = match append_ndjson_line(&path, &redacted).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "proposal audit write failed, falling back to stdout");
            intent_log("order_proposal_fallback", "ERROR", redacted);
            false
        }
    };

    Ok(EmitOutcome {
        proposal: normalized,
        written,
    })
}

async fn append_ndjson_line(path: &PathBuf, value: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut line = serde_json::to_vec(value).map_err(std::io::Error::other)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    Ok(())
}

/// Marks any PROPOSED proposal in `proposals` whose `valid_until_utc` has
/// passed as EXPIRED, logging one `expired` intent per transition.
pub fn expire_proposals(proposals: &mut [OrderProposal], now: DateTime<Utc>) {
    for p in proposals.iter_mut() {
        if p.status == ProposalStatus::Proposed && p.constraints.valid_until_utc <= now {
            *p = p.with_status(ProposalStatus::Expired);
            info!(proposal_id = %p.proposal_id, "proposal expired");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_exact_and_substring_secret_keys() {
        let input = json!({
            "api_key": "abc",
            "nested": {"user_token": "xyz", "name": "ok"},
            "list": [{"password": "p"}, {"name": "fine"}]
        });
        let redacted = redact(&input);
        assert_eq!(redacted["api_key"], json!("***REDACTED***"));
        assert_eq!(redacted["nested"]["user_token"], json!("***REDACTED***"));
        assert_eq!(redacted["nested"]["name"], json!("ok"));
        assert_eq!(redacted["list"][0]["password"], json!("***REDACTED***"));
        assert_eq!(redacted["list"][1]["name"], json!("fine"));
    }

    #[test]
    fn lifecycle_marks_same_key_superseded_within_window() {
        let mut lifecycle = ProposalLifecycle::new(30);
        let base = Utc::now();
        let p1 = crate::proposals::tests_support::sample_proposal(base, "SPY");
        let p2 = crate::proposals::tests_support::sample_proposal(base, "SPY");
        assert!(lifecycle.register(&p1, base).is_none());
        let superseded = lifecycle.register(&p2, base + chrono::Duration::seconds(10));
        assert_eq!(superseded, Some(p1.proposal_id));
    }

    #[test]
    fn lifecycle_does_not_supersede_outside_window() {
        let mut lifecycle = ProposalLifecycle::new(30);
        let base = Utc::now();
        let p1 = crate::proposals::tests_support::sample_proposal(base, "SPY");
        let p2 = crate::proposals::tests_support::sample_proposal(base, "SPY");
        lifecycle.register(&p1, base);
        let superseded = lifecycle.register(&p2, base + chrono::Duration::seconds(60));
        assert_eq!(superseded, None);
    }
}
