//! Execution Agent Loop (C8): single-threaded cooperative NDJSON follower.
//! Tails a proposals file, decides each proposal via C7, and appends
//! decisions — restart-safe by being append-only and re-tailable.

use super::decider::decide_execution;
use super::models::{ExecutionDecision, SafetySnapshot};
use crate::coordination::ShutdownSignal;
use crate::proposals::models::OrderProposal;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct ExecutionAgentConfig {
    pub proposals_path: PathBuf,
    pub decisions_base_dir: PathBuf,
    pub poll_interval: Duration,
    pub start_at_beginning: bool,
    pub agent_name: String,
    pub agent_role: String,
}

fn intent_log(intent_type: &str, severity: &str, fields: serde_json::Value) {
    let ts = Utc::now().to_rfc3339();
    let mut line = json!({
        "event_type": "intent",
        "intent_type": intent_type,
        "severity": severity,
        "ts": ts,
    });
    if let (Some(line_obj), Some(extra)) = (line.as_object_mut(), fields.as_object()) {
        for (k, v) in extra {
            line_obj.insert(k.clone(), v.clone());
        }
    }
    println!("{line}");
}

fn decisions_path_for(base_dir: &Path, now: chrono::DateTime<Utc>) -> PathBuf {
    base_dir
        .join(now.format("%Y-%m-%d").to_string())
        .join("decisions.ndjson")
}

/// Reads today's decisions file (if any) and returns the set of
/// `proposal_id`s already decided — purely for the `duplicate_seen`
/// observability flag, never to gate processing.
async fn load_prior_decision_ids_today(base_dir: &Path) -> HashSet<String> {
    let mut ids = HashSet::new();
    let path = decisions_path_for(base_dir, Utc::now());
    let Ok(contents) = tokio::fs::read_to_string(&path).await else {
        return ids;
    };
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            if let Some(id) = value.get("proposal_id").and_then(|v| v.as_str()) {
                ids.insert(id.to_string());
            }
        }
    }
    ids
}

async fn append_decision_ndjson(base_dir: &Path, decision: &ExecutionDecision) -> std::io::Result<()> {
    let path = decisions_path_for(base_dir, decision.decided_at_utc);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    let mut line = serde_json::to_vec(decision).map_err(std::io::Error::other)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    Ok(())
}

/// Builds a fresh safety snapshot from the process environment. Kill
/// switch and marketdata freshness are expected to be populated by
/// whatever upstream component owns them; here they are read as plain
/// env-provided signals, matching the rest of this loop's posture of
/// trusting external inputs only as far as the gates allow.
pub fn build_safety_snapshot() -> SafetySnapshot {
    let kill_switch = std::env::var("KILL_SWITCH_ENABLED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let stale_threshold_s: i64 = std::env::var("MARKETDATA_STALE_THRESHOLD_S")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120);
    let last_ts = std::env::var("MARKETDATA_LAST_TS_UTC")
        .ok()
        .and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let marketdata_fresh = match last_ts {
        Some(ts) => (Utc::now() - ts).num_seconds() <= stale_threshold_s,
        None => false,
    };
    let agent_mode = std::env::var("AGENT_MODE").unwrap_or_else(|_| "OBSERVE".to_string());

    SafetySnapshot {
        kill_switch,
        marketdata_fresh,
        marketdata_last_ts: last_ts,
        agent_mode,
    }
}

/// Runs the follower loop until `shutdown` fires or the proposals file is
/// exhausted and never produces further lines (in practice: until
/// shutdown). Returns once a shutdown signal is observed between reads.
pub async fn run(
    config: ExecutionAgentConfig,
    mut shutdown: broadcast::Receiver<ShutdownSignal>,
) -> std::io::Result<()> {
    if !config.proposals_path.exists() {
        intent_log(
            "execution_agent_startup_refused",
            "ERROR",
            json!({"reason_codes": ["PROPOSALS_PATH_not_found"]}),
        );
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "PROPOSALS_PATH_not_found",
        ));
    }

    let prior_ids_today = load_prior_decision_ids_today(&config.decisions_base_dir).await;
    let mut processed_ids: HashSet<String> = HashSet::new();

    intent_log(
        "execution_agent_started",
        "INFO",
        json!({"proposals_path": config.proposals_path.display().to_string()}),
    );

    let file = tokio::fs::File::open(&config.proposals_path).await?;
    let mut reader = BufReader::new(file);
    if !config.start_at_beginning {
        let end = reader.get_ref().metadata().await?.len();
        reader.seek(std::io::SeekFrom::Start(end)).await?;
    }

    let mut line = String::new();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("execution agent shutting down");
                return Ok(());
            }
            read_result = reader.read_line(&mut line) => {
                let bytes_read = read_result?;
                if bytes_read == 0 {
                    tokio::time::sleep(config.poll_interval).await;
                    continue;
                }
                let raw_line = std::mem::take(&mut line);
                process_line(&raw_line, &config, &prior_ids_today, &mut processed_ids).await;
            }
        }
    }
}

async fn process_line(
    raw_line: &str,
    config: &ExecutionAgentConfig,
    prior_ids_today: &HashSet<String>,
    processed_ids: &mut HashSet<String>,
) {
    let trimmed = raw_line.trim();
    if trimmed.is_empty() {
        return;
    }

    let proposal: OrderProposal = match serde_json::from_str(trimmed) {
        Ok(p) => p,
        Err(e) => {
            intent_log(
                "proposal_parse_error",
                "WARN",
                json!({"error": e.to_string()}),
            );
            return;
        }
    };

    let proposal_id = proposal.proposal_id.to_string();
    if processed_ids.contains(&proposal_id) {
        intent_log(
            "proposal_duplicate_seen",
            "INFO",
            json!({"proposal_id": proposal_id}),
        );
        return;
    }
    processed_ids.insert(proposal_id.clone());

    let duplicate_seen = prior_ids_today.contains(&proposal_id);
    let safety = build_safety_snapshot();
    let decision = decide_execution(
        &proposal,
        &safety,
        &config.agent_name,
        &config.agent_role,
        None,
    );

    intent_log(
        "execution_decision",
        "INFO",
        json!({
            "proposal_id": proposal_id,
            "decision": decision.decision,
            "duplicate_seen": duplicate_seen,
        }),
    );

    if let Err(e) = append_decision_ndjson(&config.decisions_base_dir, &decision).await {
        warn!(error = %e, "decision append failed, falling back to stdout");
        intent_log(
            "decision_output_fallback_stdout",
            "ERROR",
            serde_json::to_value(&decision).unwrap_or(json!({})),
        );
    }
}
