//! S7 — idempotent shadow executor: the same (tenant, intent_id) executed
//! twice simulates once and is skipped as a duplicate the second time,
//! leaving exactly one record in `shadowTradeHistory`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use tradeguard::persistence::document_store::InMemoryDocumentStore;
use tradeguard::shadow::executor::{ExecutionOutcome, ShadowIntent, ShadowOptionExecutor};
use tradeguard::shadow::store::{ShadowOptionTradeStore, COLLECTION_NAME};
use tradeguard::DocumentStore;

#[tokio::test]
async fn duplicate_intent_replay_is_skipped_after_first_simulated_fill() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let executor = ShadowOptionExecutor::new(ShadowOptionTradeStore::new(store.clone()));

    let resolved_contract = json!({"contract_symbol": "SPY250117C00500000"});
    let quantity = json!(2);
    let intent = ShadowIntent {
        tenant_id: "acme",
        intent_id: "intent-1",
        side: "BUY",
        quantity: Some(&quantity),
        options: None,
        meta: None,
        contract_symbol: None,
    };

    let now = Utc::now();
    let first = executor.execute(&intent, &resolved_contract, None, now).await;
    match &first {
        ExecutionOutcome::Simulated { record, .. } => {
            assert_eq!(record["status"], json!("simulated"));
        }
        other => panic!("expected Simulated, got {other:?}"),
    }

    let second = executor.execute(&intent, &resolved_contract, None, now).await;
    match &second {
        ExecutionOutcome::Skipped { reason, .. } => {
            assert_eq!(reason, "duplicate_intent_replay");
        }
        other => panic!("expected Skipped(duplicate_intent_replay), got {other:?}"),
    }

    let doc_id = tradeguard::shadow::store::stable_uuid_from_key("acme:shadow_option_intent:intent-1").to_string();
    let stored = store.get(COLLECTION_NAME, &doc_id).await.unwrap();
    assert!(stored.is_some(), "exactly one record exists at the deterministic doc id");
}
