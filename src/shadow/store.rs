//! Idempotent append-only shadow fill store (C10 storage half).

use crate::error::Result;
use crate::persistence::document_store::DocumentStore;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

pub const COLLECTION_NAME: &str = "shadowTradeHistory";

/// Deterministic UUID derived from a string key, used as the document id
/// for restart-safe idempotent creation — the same `(tenant, intent)`
/// pair always maps to the same id, so a replayed intent collides with
/// its own prior record instead of creating a duplicate.
pub fn stable_uuid_from_key(key: &str) -> uuid::Uuid {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, key.as_bytes())
}

pub struct ShadowOptionTradeStore {
    store: Arc<dyn DocumentStore>,
}

impl ShadowOptionTradeStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Creates the record at `doc_id` if absent. On a replay of the same
    /// `doc_id`, returns the existing record with `created=false` instead
    /// of erroring — the caller (the executor) cannot distinguish "never
    /// ran" from "already ran" any other way.
    pub async fn create_simulated_once(
        &self,
        doc_id: &str,
        intent_id: &str,
        option_symbol: &str,
        contracts: i64,
        side: &str,
        reason: &str,
        metadata_snapshot: Value,
        now_utc: DateTime<Utc>,
    ) -> Result<(Value, bool)> {
        let record = json!({
            "intent_id": intent_id,
            "option_symbol": option_symbol,
            "contracts": contracts,
            "side": side,
            "timestamp_iso": now_utc.to_rfc3339(),
            "status": "simulated",
            "reason": reason,
            "metadata_snapshot": metadata_snapshot,
        });

        match self.store.create(COLLECTION_NAME, doc_id, record.clone()).await {
            Ok(()) => Ok((record, true)),
            Err(crate::error::PlatformError::AlreadyExists(_)) => {
                let existing = self
                    .store
                    .get(COLLECTION_NAME, doc_id)
                    .await?
                    .unwrap_or(record);
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::document_store::InMemoryDocumentStore;

    #[test]
    fn stable_uuid_is_deterministic() {
        let a = stable_uuid_from_key("tenant:shadow_option_intent:intent-1");
        let b = stable_uuid_from_key("tenant:shadow_option_intent:intent-1");
        assert_eq!(a, b);
    }

    #[test]
    fn stable_uuid_differs_by_key() {
        let a = stable_uuid_from_key("tenant:shadow_option_intent:intent-1");
        let b = stable_uuid_from_key("tenant:shadow_option_intent:intent-2");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn replayed_doc_id_returns_existing_without_overwrite() {
        let backing = Arc::new(InMemoryDocumentStore::new());
        let store = ShadowOptionTradeStore::new(backing);
        let now = Utc::now();
        let (_first, created1) = store
            .create_simulated_once("doc-1", "intent-1", "SPY_C", 1, "BUY", "ok", json!({}), now)
            .await
            .unwrap();
        let (second, created2) = store
            .create_simulated_once("doc-1", "intent-1", "SPY_C", 99, "SELL", "different", json!({}), now)
            .await
            .unwrap();
        assert!(created1);
        assert!(!created2);
        assert_eq!(second["contracts"], json!(1));
    }
}
