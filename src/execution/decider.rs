//! Pure execution decision function (C7). Default posture is REJECT; a
//! proposal is approved only when every gate passes.

use super::models::{Decision, ExecutionDecision, SafetySnapshot};
use crate::proposals::models::OrderProposal;
use chrono::{DateTime, Utc};
use serde_json::json;

fn compact_recommended_order(proposal: &OrderProposal) -> serde_json::Value {
    json!({
        "symbol": proposal.symbol,
        "side": proposal.side,
        "quantity": proposal.quantity,
        "limit_price": proposal.limit_price,
        "time_in_force": proposal.time_in_force,
        "valid_until_utc": proposal.constraints.valid_until_utc,
        "requires_human_approval": proposal.constraints.requires_human_approval,
        "asset_type": proposal.asset_type,
    })
}

/// Decides APPROVE/REJECT for `proposal` given a fresh `safety` snapshot.
/// Reasons accumulate — a rejected proposal may carry more than one code.
pub fn decide_execution(
    proposal: &OrderProposal,
    safety: &SafetySnapshot,
    agent_name: &str,
    agent_role: &str,
    now: Option<DateTime<Utc>>,
) -> ExecutionDecision {
    let now = now.unwrap_or_else(Utc::now);
    let mut reasons = Vec::new();

    if safety.kill_switch {
        reasons.push("kill_switch_enabled".to_string());
    }
    if !safety.marketdata_fresh {
        reasons.push("marketdata_stale_or_missing".to_string());
    }
    if proposal.constraints.requires_human_approval {
        reasons.push("requires_human_approval".to_string());
    }
    if proposal.constraints.valid_until_utc <= now {
        reasons.push("proposal_expired".to_string());
    }

    let decision = if reasons.is_empty() {
        Decision::Approve
    } else {
        Decision::Reject
    };
    let notes = match decision {
        Decision::Approve => "all safety and approval gates passed".to_string(),
        Decision::Reject => format!("rejected: {}", reasons.join(", ")),
    };

    ExecutionDecision {
        decision_id: uuid::Uuid::new_v4(),
        decided_at_utc: now,
        proposal_id: proposal.proposal_id,
        correlation_id: proposal.correlation_id.clone(),
        agent_name: agent_name.to_string(),
        agent_role: agent_role.to_string(),
        decision,
        reject_reason_codes: reasons,
        notes,
        recommended_order: compact_recommended_order(proposal),
        safety_snapshot: safety.clone(),
    }
}
