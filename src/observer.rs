//! Options Observer (C14): read-only reconstruction of why a plan was
//! created, which contract it selected, and whether it executed, built
//! entirely from already-recorded proposal/decision audit artifacts.
//! Grounded on `original_source/backend/observer/options_observer.py`.
//!
//! Safety guarantees (absolute, matching the original):
//! - READ-ONLY: only reads local NDJSON audit files.
//! - No broker calls, no execution logic, no filesystem writes.
//!
//! Unlike the original, this module's only readers and writers are this
//! crate's own [`crate::proposals::emitter`] and
//! [`crate::execution::agent`], so proposals and decisions are always
//! well-typed [`OrderProposal`]/[`ExecutionDecision`] records rather than
//! arbitrary plan dicts — the generic dict-walking fallback the original
//! needed for foreign plan shapes has no counterpart here.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::execution::models::ExecutionDecision;
use crate::proposals::models::{OrderProposal, ProposalAssetType};

#[derive(Debug, Clone, Serialize)]
pub struct ContractSelection {
    pub underlying_symbol: String,
    pub expiration: Option<String>,
    pub right: Option<String>,
    pub strike: Option<f64>,
    pub contract_symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyFactor {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEvidence {
    pub decision: String,
    pub decided_at_utc: Option<String>,
    pub decision_id: Option<String>,
    pub reject_reason_codes: Vec<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
}

impl ExecutionEvidence {
    fn unknown() -> Self {
        Self {
            decision: "UNKNOWN".to_string(),
            decided_at_utc: None,
            decision_id: None,
            reject_reason_codes: Vec::new(),
            notes: None,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplanationRecord {
    pub plan_id: Option<String>,
    pub correlation_id: Option<String>,
    pub created_at_utc: Option<String>,
    pub strategy_name: Option<String>,
    pub agent_name: Option<String>,
    pub underlying_symbol: Option<String>,
    pub selected_contract: Option<ContractSelection>,
    pub side: Option<String>,
    pub quantity: Option<i64>,
    pub limit_price: Option<f64>,
    pub time_in_force: Option<String>,
    pub why: Option<String>,
    pub key_factors: Vec<KeyFactor>,
    pub execution_succeeded: Option<bool>,
    pub execution: ExecutionEvidence,
    pub sources: Vec<String>,
}

impl ExplanationRecord {
    fn empty(source: Option<PathBuf>) -> Self {
        Self {
            plan_id: None,
            correlation_id: None,
            created_at_utc: None,
            strategy_name: None,
            agent_name: None,
            underlying_symbol: None,
            selected_contract: None,
            side: None,
            quantity: None,
            limit_price: None,
            time_in_force: None,
            why: None,
            key_factors: Vec::new(),
            execution_succeeded: None,
            execution: ExecutionEvidence::unknown(),
            sources: source.map(|p| vec![p.display().to_string()]).unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("ExplanationRecord always serializes")
    }

    pub fn to_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.push("Options Observer Explanation".to_string());
        lines.push(String::new());
        if let Some(v) = &self.plan_id {
            lines.push(format!("- plan_id: {v}"));
        }
        if let Some(v) = &self.correlation_id {
            lines.push(format!("- correlation_id: {v}"));
        }
        if let Some(v) = &self.created_at_utc {
            lines.push(format!("- created_at_utc: {v}"));
        }
        if let Some(v) = &self.strategy_name {
            lines.push(format!("- strategy_name: {v}"));
        }
        if let Some(v) = &self.agent_name {
            lines.push(format!("- agent_name: {v}"));
        }
        if let Some(v) = &self.underlying_symbol {
            lines.push(format!("- underlying: {v}"));
        }
        lines.push(String::new());

        lines.push("Why the plan was created".to_string());
        lines.push(format!(
            "- why: {}",
            self.why.as_deref().unwrap_or("unknown (missing rationale in artifacts)")
        ));
        if !self.key_factors.is_empty() {
            lines.push("- key_factors:".to_string());
            for kf in self.key_factors.iter().take(10) {
                lines.push(format!("  - {} (value={})", kf.name, kf.value));
            }
            if self.key_factors.len() > 10 {
                lines.push(format!("  - ... ({} more)", self.key_factors.len() - 10));
            }
        }
        lines.push(String::new());

        lines.push("What contract was selected".to_string());
        match &self.selected_contract {
            None => lines.push("- selected_contract: unknown (no option fields found in plan)".to_string()),
            Some(c) => {
                let mut parts = vec![c.underlying_symbol.clone()];
                if let Some(e) = &c.expiration {
                    parts.push(e.clone());
                }
                if let Some(r) = &c.right {
                    parts.push(r.clone());
                }
                if let Some(s) = c.strike {
                    parts.push(s.to_string());
                }
                if let Some(cs) = &c.contract_symbol {
                    parts.push(format!("({cs})"));
                }
                lines.push(format!("- selected_contract: {}", parts.join(" ")));
            }
        }
        lines.push(String::new());

        lines.push("Whether execution succeeded (from artifacts/logs)".to_string());
        match self.execution_succeeded {
            Some(true) => lines.push("- execution_succeeded: true".to_string()),
            Some(false) => lines.push("- execution_succeeded: false".to_string()),
            None => lines.push("- execution_succeeded: unknown (no decision/result evidence found)".to_string()),
        }
        lines.push(format!("- execution_decision: {}", self.execution.decision));
        if !self.execution.reject_reason_codes.is_empty() {
            lines.push(format!("- reject_reason_codes: {}", self.execution.reject_reason_codes.join(", ")));
        }
        if let Some(n) = &self.execution.notes {
            lines.push(format!("- notes: {n}"));
        }
        if let Some(s) = &self.execution.source {
            lines.push(format!("- evidence_source: {s}"));
        }
        if !self.sources.is_empty() {
            lines.push(format!("- sources: {}", self.sources.join(", ")));
        }
        lines.join("\n").trim_end().to_string() + "\n"
    }
}

impl crate::explain::Explainable for ExplanationRecord {
    fn severity_label(&self) -> &'static str {
        match self.execution_succeeded {
            Some(false) => "REJECTED",
            Some(true) => "EXECUTED",
            None => "UNKNOWN",
        }
    }

    fn key_factors(&self) -> Vec<String> {
        self.key_factors.iter().take(10).map(|kf| format!("{}={}", kf.name, kf.value)).collect()
    }
}

/// Picks a human-friendly subset of indicator keys if present, else the
/// first 12 raw keys in declaration order.
fn coerce_key_factors_from_indicators(indicators: &Value) -> Vec<KeyFactor> {
    const PREFERRED: &[&str] = &["signal", "thesis", "regime", "trend", "flow", "gex", "iv", "delta", "gamma"];
    let Value::Object(map) = indicators else {
        return Vec::new();
    };
    let mut out: Vec<KeyFactor> = PREFERRED
        .iter()
        .filter_map(|k| map.get(*k).map(|v| KeyFactor { name: k.to_string(), value: v.clone() }))
        .collect();
    if out.is_empty() {
        out = map
            .iter()
            .take(12)
            .map(|(k, v)| KeyFactor { name: k.clone(), value: v.clone() })
            .collect();
    }
    out
}

fn extract_contract_from_proposal(proposal: &OrderProposal) -> Option<ContractSelection> {
    let opt = proposal.option.as_ref()?;
    Some(ContractSelection {
        underlying_symbol: proposal.symbol.clone(),
        expiration: Some(opt.expiration.clone()),
        right: Some(format!("{:?}", opt.right).to_uppercase()),
        strike: Some(opt.strike),
        contract_symbol: opt.contract_symbol.clone(),
    })
}

fn iter_ndjson<T: serde::de::DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<T>(l).ok())
        .collect()
}

/// Lists every `file_name` under one level of date-named subdirectories
/// of `root`, newest subdirectory first. Mirrors the original's
/// `audit_dir.glob("proposals/*/proposals.ndjson")` without pulling in a
/// glob crate.
fn dated_ndjson_files(root: &Path, file_name: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.reverse();
    dirs.into_iter()
        .map(|d| d.join(file_name))
        .filter(|p| p.is_file())
        .collect()
}

/// Scans `audit_dir/proposals/<date>/proposals.ndjson` files, newest date
/// first, and returns the last OPTION-asset proposal found plus the file
/// it came from.
fn pick_last_option_proposal(audit_dir: &Path) -> Option<(OrderProposal, PathBuf)> {
    let proposals_root = audit_dir.join("proposals");
    for path in dated_ndjson_files(&proposals_root, "proposals.ndjson") {
        let mut last: Option<OrderProposal> = None;
        for proposal in iter_ndjson::<OrderProposal>(&path) {
            if proposal.asset_type != ProposalAssetType::Option {
                continue;
            }
            last = Some(proposal);
        }
        if let Some(p) = last {
            return Some((p, path));
        }
    }
    None
}

/// Scans `decisions_dir/<date>/decisions.ndjson` files for the decision
/// matching `proposal_id` (or, failing that, `correlation_id`), keeping
/// the most recently decided match across all files scanned.
fn pick_last_execution_decision(
    decisions_dir: &Path,
    proposal_id: &str,
    correlation_id: Option<&str>,
) -> Option<(ExecutionDecision, PathBuf)> {
    let mut best: Option<(ExecutionDecision, PathBuf)> = None;
    for path in dated_ndjson_files(decisions_dir, "decisions.ndjson") {
        for decision in iter_ndjson::<ExecutionDecision>(&path) {
            let pid_matches = decision.proposal_id.to_string() == proposal_id;
            let cid_matches = correlation_id.is_some() && decision.correlation_id.as_deref() == correlation_id;
            if !pid_matches && !cid_matches {
                continue;
            }
            let better = match &best {
                None => true,
                Some((prev, _)) => decision.decided_at_utc >= prev.decided_at_utc,
            };
            if better {
                best = Some((decision, path.clone()));
            }
        }
        if best.is_some() {
            break;
        }
    }
    best
}

/// Explains one proposal: its rationale, selected contract, and the
/// matching execution decision, if one has been recorded.
pub fn explain_proposal(proposal: &OrderProposal, decisions_dir: &Path) -> ExplanationRecord {
    let decision_match = pick_last_execution_decision(
        decisions_dir,
        &proposal.proposal_id.to_string(),
        proposal.correlation_id.as_deref(),
    );

    let (execution, execution_succeeded, decision_source) = match &decision_match {
        Some((decision, path)) => {
            let decision_str = match decision.decision {
                crate::execution::models::Decision::Approve => "APPROVE",
                crate::execution::models::Decision::Reject => "REJECT",
            };
            (
                ExecutionEvidence {
                    decision: decision_str.to_string(),
                    decided_at_utc: Some(decision.decided_at_utc.to_rfc3339()),
                    decision_id: Some(decision.decision_id.to_string()),
                    reject_reason_codes: decision.reject_reason_codes.clone(),
                    notes: if decision.notes.is_empty() { None } else { Some(decision.notes.clone()) },
                    source: Some(path.display().to_string()),
                },
                Some(decision_str == "APPROVE"),
                Some(path.clone()),
            )
        }
        None => (ExecutionEvidence::unknown(), None, None),
    };

    let mut sources = Vec::new();
    if let Some(p) = decision_source {
        sources.push(p.display().to_string());
    }

    ExplanationRecord {
        plan_id: Some(proposal.proposal_id.to_string()),
        correlation_id: proposal.correlation_id.clone(),
        created_at_utc: Some(proposal.created_at_utc.to_rfc3339()),
        strategy_name: Some(proposal.strategy_name.clone()),
        agent_name: Some(proposal.agent_name.clone()),
        underlying_symbol: Some(proposal.symbol.clone()),
        selected_contract: extract_contract_from_proposal(proposal),
        side: Some(format!("{:?}", proposal.side).to_uppercase()),
        quantity: Some(proposal.quantity),
        limit_price: proposal.limit_price,
        time_in_force: Some(format!("{:?}", proposal.time_in_force).to_uppercase()),
        why: Some(proposal.rationale.short_reason.clone()),
        key_factors: coerce_key_factors_from_indicators(&proposal.rationale.indicators),
        execution_succeeded,
        execution,
        sources,
    }
}

/// Finds the most recent recorded OPTION proposal in `audit_dir` and
/// explains it against the decisions recorded under `decisions_dir`.
/// Returns a stable empty-shaped record (not an error) when no option
/// proposal has been recorded yet.
pub fn explain_last_option_trade(audit_dir: &Path, decisions_dir: &Path) -> Result<ExplanationRecord> {
    let Some((proposal, proposal_path)) = pick_last_option_proposal(audit_dir) else {
        return Ok(ExplanationRecord::empty(None));
    };
    let mut record = explain_proposal(&proposal, decisions_dir);
    record.sources.push(proposal_path.display().to_string());
    let mut seen = std::collections::HashSet::new();
    record.sources.retain(|s| seen.insert(s.clone()));
    Ok(record)
}
