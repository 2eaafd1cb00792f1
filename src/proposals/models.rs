//! Typed order-proposal schema. Immutable once constructed: fields are
//! private with accessors, and the only mutating operation is
//! [`OrderProposal::with_status`], which returns a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalStatus {
    Proposed,
    Rejected,
    Superseded,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalAssetType {
    Option,
    Equity,
    Future,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalTimeInForce {
    Day,
    Gtc,
    Ioc,
}

impl Default for ProposalTimeInForce {
    fn default() -> Self {
        ProposalTimeInForce::Day
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionRight {
    Call,
    Put,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalOption {
    pub expiration: String,
    pub right: OptionRight,
    pub strike: f64,
    #[serde(default)]
    pub contract_symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRationale {
    pub short_reason: String,
    #[serde(default)]
    pub indicators: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalRisk {
    #[serde(default)]
    pub max_loss_usd: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalConstraints {
    pub valid_until_utc: DateTime<Utc>,
    #[serde(default = "default_requires_approval")]
    pub requires_human_approval: bool,
}

fn default_requires_approval() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderProposal {
    pub proposal_id: Uuid,
    pub created_at_utc: DateTime<Utc>,
    pub repo_id: String,
    pub agent_name: String,
    pub strategy_name: String,
    #[serde(default)]
    pub strategy_version: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub symbol: String,
    pub asset_type: ProposalAssetType,
    #[serde(default)]
    pub option: Option<ProposalOption>,
    pub side: ProposalSide,
    pub quantity: i64,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub time_in_force: ProposalTimeInForce,
    pub rationale: ProposalRationale,
    #[serde(default)]
    pub risk: ProposalRisk,
    pub constraints: ProposalConstraints,
    pub status: ProposalStatus,
}

impl OrderProposal {
    /// Returns a new proposal with `status` replaced; the original is
    /// untouched. Proposals are audit records — once appended, only new
    /// values may be produced, never in-place edits.
    pub fn with_status(&self, status: ProposalStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next
    }

    /// `(strategy_name, symbol, contract_key)` used by the emitter's
    /// in-memory lifecycle to detect same-instrument re-proposals.
    pub fn lifecycle_key(&self) -> (String, String, String) {
        let contract_key = match (&self.asset_type, &self.option) {
            (ProposalAssetType::Option, Some(opt)) => format!(
                "{}:{}:{:?}:{}",
                self.symbol, opt.expiration, opt.right, opt.strike
            ),
            _ => format!("{}:{:?}", self.symbol, self.asset_type),
        };
        (self.strategy_name.clone(), self.symbol.clone(), contract_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sample() -> OrderProposal {
        OrderProposal {
            proposal_id: Uuid::new_v4(),
            created_at_utc: Utc::now(),
            repo_id: "trading-platform".into(),
            agent_name: "momentum".into(),
            strategy_name: "momentum-v1".into(),
            strategy_version: None,
            correlation_id: None,
            symbol: "SPY".into(),
            asset_type: ProposalAssetType::Equity,
            option: None,
            side: ProposalSide::Buy,
            quantity: 10,
            limit_price: Some(500.0),
            time_in_force: ProposalTimeInForce::Day,
            rationale: ProposalRationale {
                short_reason: "breakout".into(),
                indicators: json!({"rsi": 70}),
            },
            risk: ProposalRisk::default(),
            constraints: ProposalConstraints {
                valid_until_utc: Utc::now() + Duration::minutes(5),
                requires_human_approval: true,
            },
            status: ProposalStatus::Proposed,
        }
    }

    #[test]
    fn with_status_does_not_mutate_original() {
        let p = sample();
        let superseded = p.with_status(ProposalStatus::Superseded);
        assert_eq!(p.status, ProposalStatus::Proposed);
        assert_eq!(superseded.status, ProposalStatus::Superseded);
    }

    #[test]
    fn lifecycle_key_for_equity_omits_option_fields() {
        let p = sample();
        let (strategy, symbol, key) = p.lifecycle_key();
        assert_eq!(strategy, "momentum-v1");
        assert_eq!(symbol, "SPY");
        assert!(key.contains("Equity"));
    }

    #[test]
    fn unknown_fields_are_rejected_on_decode() {
        let json = json!({
            "proposal_id": Uuid::new_v4(),
            "created_at_utc": Utc::now(),
            "repo_id": "r", "agent_name": "a", "strategy_name": "s",
            "symbol": "SPY", "asset_type": "EQUITY", "side": "BUY",
            "quantity": 1,
            "rationale": {"short_reason": "x"},
            "constraints": {"valid_until_utc": Utc::now(), "requires_human_approval": true},
            "status": "PROPOSED",
            "unexpected_field": true,
        });
        let result: Result<OrderProposal, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
