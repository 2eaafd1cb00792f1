//! Shadow executor (C10 execution half): HOLD detection, contract-count
//! parsing, and the idempotent simulated-fill write.

use super::store::{stable_uuid_from_key, ShadowOptionTradeStore};
use serde_json::Value;
use tracing::info;

const HOLD_VALUES: &[&str] = &["hold", "no_op", "noop", "none"];
const HOLD_KEYS: &[&str] = &[
    "action",
    "signal_action",
    "signalAction",
    "decision",
    "intent_action",
    "intentAction",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Simulated {
        doc_id: String,
        record: Value,
    },
    Skipped {
        reason: String,
        doc_id: Option<String>,
        record: Option<Value>,
    },
}

/// Looks for a HOLD-shaped action key in either of the two metadata
/// containers an intent may carry (`options`, `meta`), matching whichever
/// comes first. Returns the matched `key=value` pair for the reason
/// string.
fn detect_hold(options: Option<&Value>, meta: Option<&Value>) -> Option<String> {
    for container in [options, meta].into_iter().flatten() {
        let Some(obj) = container.as_object() else {
            continue;
        };
        for key in HOLD_KEYS {
            if let Some(v) = obj.get(*key).and_then(|v| v.as_str()) {
                let normalized = v.trim().to_ascii_lowercase();
                if HOLD_VALUES.contains(&normalized.as_str()) {
                    return Some(format!("hold:{key}={normalized}"));
                }
            }
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractsError {
    Missing,
    Invalid,
    NonPositive,
    NonInteger,
}

impl ContractsError {
    fn reason(&self) -> &'static str {
        match self {
            ContractsError::Missing => "missing_quantity_contracts",
            ContractsError::Invalid => "invalid_quantity_contracts",
            ContractsError::NonPositive => "non_positive_quantity_contracts",
            ContractsError::NonInteger => "non_integer_quantity_contracts",
        }
    }
}

/// Parses `quantity` as a strictly-positive integer contract count.
fn parse_contracts(quantity: Option<&Value>) -> Result<i64, ContractsError> {
    let value = quantity.ok_or(ContractsError::Missing)?;
    let as_f64 = match value {
        Value::Number(n) => n.as_f64().ok_or(ContractsError::Invalid)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| ContractsError::Invalid)?,
        _ => return Err(ContractsError::Invalid),
    };
    if as_f64 <= 0.0 {
        return Err(ContractsError::NonPositive);
    }
    if as_f64.fract() != 0.0 {
        return Err(ContractsError::NonInteger);
    }
    Ok(as_f64 as i64)
}

fn resolve_option_symbol(resolved_contract: &Value, fallback_contract_symbol: Option<&str>) -> Option<String> {
    for key in ["contract_symbol", "symbol", "option_symbol", "occ_symbol", "occSymbol"] {
        if let Some(s) = resolved_contract.get(key).and_then(|v| v.as_str()) {
            if !s.trim().is_empty() {
                return Some(s.to_string());
            }
        }
    }
    fallback_contract_symbol.map(|s| s.to_string())
}

pub struct ShadowIntent<'a> {
    pub tenant_id: &'a str,
    pub intent_id: &'a str,
    pub side: &'a str,
    pub quantity: Option<&'a Value>,
    pub options: Option<&'a Value>,
    pub meta: Option<&'a Value>,
    pub contract_symbol: Option<&'a str>,
}

pub struct ShadowOptionExecutor {
    store: ShadowOptionTradeStore,
}

impl ShadowOptionExecutor {
    pub fn new(store: ShadowOptionTradeStore) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        intent: &ShadowIntent<'_>,
        resolved_contract: &Value,
        metadata: Option<Value>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ExecutionOutcome {
        info!(intent_id = intent.intent_id, "option.execution.attempt");

        if let Some(reason) = detect_hold(intent.options, intent.meta) {
            info!(intent_id = intent.intent_id, reason = %reason, "option.execution.skipped");
            return ExecutionOutcome::Skipped {
                reason,
                doc_id: None,
                record: None,
            };
        }

        let contracts = match parse_contracts(intent.quantity) {
            Ok(c) => c,
            Err(e) => {
                let reason = e.reason().to_string();
                info!(intent_id = intent.intent_id, reason = %reason, "option.execution.skipped");
                return ExecutionOutcome::Skipped {
                    reason,
                    doc_id: None,
                    record: None,
                };
            }
        };

        let option_symbol =
            resolve_option_symbol(resolved_contract, intent.contract_symbol).unwrap_or_default();
        let doc_id = stable_uuid_from_key(&format!(
            "{}:shadow_option_intent:{}",
            intent.tenant_id, intent.intent_id
        ))
        .to_string();

        let snapshot = serde_json::json!({
            "resolved_contract": resolved_contract,
            "metadata": metadata,
        });

        match self
            .store
            .create_simulated_once(
                &doc_id,
                intent.intent_id,
                &option_symbol,
                contracts,
                intent.side,
                "selected",
                snapshot,
                now,
            )
            .await
        {
            Ok((record, true)) => {
                info!(intent_id = intent.intent_id, doc_id = %doc_id, "option.execution.simulated");
                ExecutionOutcome::Simulated { doc_id, record }
            }
            Ok((record, false)) => {
                info!(intent_id = intent.intent_id, doc_id = %doc_id, "option.execution.skipped");
                ExecutionOutcome::Skipped {
                    reason: "duplicate_intent_replay".to_string(),
                    doc_id: Some(doc_id),
                    record: Some(record),
                }
            }
            Err(e) => ExecutionOutcome::Skipped {
                reason: format!("store_error:{e}"),
                doc_id: Some(doc_id),
                record: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::document_store::InMemoryDocumentStore;
    use serde_json::json;
    use std::sync::Arc;

    fn executor() -> ShadowOptionExecutor {
        let backing = Arc::new(InMemoryDocumentStore::new());
        ShadowOptionExecutor::new(ShadowOptionTradeStore::new(backing))
    }

    #[tokio::test]
    async fn hold_action_skips_without_writing() {
        let executor = executor();
        let intent = ShadowIntent {
            tenant_id: "acme",
            intent_id: "i1",
            side: "BUY",
            quantity: None,
            options: Some(&json!({"action": "HOLD"})),
            meta: None,
            contract_symbol: None,
        };
        let outcome = executor
            .execute(&intent, &json!({}), None, chrono::Utc::now())
            .await;
        match outcome {
            ExecutionOutcome::Skipped { reason, doc_id, .. } => {
                assert!(reason.starts_with("hold:action="));
                assert!(doc_id.is_none());
            }
            _ => panic!("expected skip"),
        }
    }

    #[tokio::test]
    async fn non_integer_quantity_is_skipped() {
        let executor = executor();
        let qty = json!("1.5");
        let intent = ShadowIntent {
            tenant_id: "acme",
            intent_id: "i1",
            side: "BUY",
            quantity: Some(&qty),
            options: None,
            meta: None,
            contract_symbol: None,
        };
        let outcome = executor
            .execute(&intent, &json!({}), None, chrono::Utc::now())
            .await;
        match outcome {
            ExecutionOutcome::Skipped { reason, .. } => {
                assert_eq!(reason, "non_integer_quantity_contracts")
            }
            _ => panic!("expected skip"),
        }
    }

    #[tokio::test]
    async fn first_write_simulates_replay_skips() {
        let executor = executor();
        let qty = json!(2);
        let intent = ShadowIntent {
            tenant_id: "acme",
            intent_id: "i1",
            side: "BUY",
            quantity: Some(&qty),
            options: None,
            meta: None,
            contract_symbol: Some("SPY_500C"),
        };
        let first = executor
            .execute(&intent, &json!({}), None, chrono::Utc::now())
            .await;
        assert!(matches!(first, ExecutionOutcome::Simulated { .. }));

        let second = executor
            .execute(&intent, &json!({}), None, chrono::Utc::now())
            .await;
        match second {
            ExecutionOutcome::Skipped { reason, .. } => {
                assert_eq!(reason, "duplicate_intent_replay")
            }
            _ => panic!("expected skip on replay"),
        }
    }

    #[test]
    fn parse_contracts_rejects_non_positive() {
        assert_eq!(
            parse_contracts(Some(&json!(0))).unwrap_err(),
            ContractsError::NonPositive
        );
        assert_eq!(
            parse_contracts(Some(&json!(-3))).unwrap_err(),
            ContractsError::NonPositive
        );
    }

    #[test]
    fn parse_contracts_accepts_positive_integer_string() {
        assert_eq!(parse_contracts(Some(&json!("4"))).unwrap(), 4);
    }
}
