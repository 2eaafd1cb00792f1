//! Fail-closed proposal validation. Errors accumulate rather than
//! short-circuiting so callers see every problem in one pass.

use super::models::{OrderProposal, ProposalAssetType, ProposalStatus};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalValidationError {
    pub errors: Vec<String>,
}

impl std::fmt::Display for ProposalValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proposal validation failed: {:?}", self.errors)
    }
}

impl std::error::Error for ProposalValidationError {}

/// Current agent operating mode. Non-goal: real LIVE execution — this
/// exists so C4's "force approval unless LIVE" rule has something to
/// check, not to enable a live path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    Observe,
    Live,
}

/// Validates and, when necessary, normalizes a proposal. On success
/// returns the (possibly normalized) proposal; on failure returns every
/// accumulated error string.
pub fn validate_proposal(
    proposal: &OrderProposal,
    agent_mode: AgentMode,
    symbol_allowlist: Option<&[String]>,
    now: Option<DateTime<Utc>>,
) -> Result<OrderProposal, ProposalValidationError> {
    let now = now.unwrap_or_else(Utc::now);
    let mut errors = Vec::new();

    if proposal.status != ProposalStatus::Proposed {
        errors.push(format!(
            "status must be PROPOSED on emit, got {:?}",
            proposal.status
        ));
    }

    if proposal.quantity <= 0 {
        errors.push(format!("quantity must be > 0, got {}", proposal.quantity));
    }

    if proposal.constraints.valid_until_utc <= now {
        errors.push(format!(
            "valid_until_utc must be in the future, got {} (now {})",
            proposal.constraints.valid_until_utc, now
        ));
    }

    if let Some(allowlist) = symbol_allowlist {
        if !allowlist.is_empty()
            && !allowlist
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&proposal.symbol))
        {
            errors.push(format!("symbol not in allowlist: {}", proposal.symbol));
        }
    }

    if proposal.asset_type == ProposalAssetType::Option && proposal.option.is_none() {
        errors.push("OPTION asset_type requires an option block".to_string());
    }

    if !errors.is_empty() {
        return Err(ProposalValidationError { errors });
    }

    let force_approval = agent_mode != AgentMode::Live;
    if force_approval && !proposal.constraints.requires_human_approval {
        let mut normalized = proposal.clone();
        normalized.constraints.requires_human_approval = true;
        return Ok(normalized);
    }

    Ok(proposal.clone())
}
