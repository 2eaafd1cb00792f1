//! Deterministic DLQ sampling and visibility-only delivery observation
//! (C11.6 observability surfaces).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::persistence::document_store::DocumentStore;

use super::ordering::normalize_doc_id;

const DLQ_SAMPLES_COLLECTION: &str = "ops_pubsub_dlq_samples";
const DELIVERIES_COLLECTION: &str = "ops_pubsub_deliveries";

/// Deterministic `[0, 1)` fraction derived from `message_id`, stable across
/// retries and process restarts — sampling decisions don't flap.
fn sample_fraction(message_id: &str) -> f64 {
    let digest = Sha256::digest(message_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let n = u64::from_be_bytes(bytes);
    (n as f64) / (u64::MAX as f64 + 1.0)
}

pub fn deterministic_sample(message_id: &str, sample_rate: f64) -> bool {
    if sample_rate <= 0.0 {
        return false;
    }
    if sample_rate >= 1.0 {
        return true;
    }
    let mid = message_id.trim();
    if mid.is_empty() {
        return false;
    }
    sample_fraction(mid) < sample_rate
}

#[allow(clippy::too_many_arguments)]
pub async fn maybe_write_sampled_dlq_event(
    store: &dyn DocumentStore,
    message_id: &str,
    subscription: &str,
    topic: &str,
    handler: &str,
    http_status: u16,
    reason: &str,
    error: &str,
    delivery_attempt: Option<u32>,
    attributes: Value,
    payload: Option<Value>,
    sample_rate: f64,
    now: DateTime<Utc>,
) -> Result<bool> {
    if !deterministic_sample(message_id, sample_rate) {
        return Ok(false);
    }
    let mid = message_id.trim();
    if mid.is_empty() {
        return Ok(false);
    }

    let doc_id = normalize_doc_id(mid);
    let doc = json!({
        "messageId": mid,
        "subscription": subscription,
        "topic": topic,
        "handler": handler,
        "httpStatus": http_status,
        "reason": reason,
        "error": error.chars().take(2000).collect::<String>(),
        "deliveryAttempt": delivery_attempt,
        "attributes": attributes,
        "payload": payload,
        "createdAt": now.to_rfc3339(),
    });

    match store.create(DLQ_SAMPLES_COLLECTION, &doc_id, doc).await {
        Ok(()) => Ok(true),
        Err(crate::error::PlatformError::AlreadyExists(_)) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Records that a push delivery happened. Returns `Some(true)` for a
/// duplicate delivery, `Some(false)` for a first sighting, `None` on a
/// best-effort write failure. Must never gate processing — visibility only.
pub async fn observe_pubsub_delivery(
    store: &dyn DocumentStore,
    message_id: &str,
    topic: &str,
    subscription: &str,
    handler: &str,
    published_at: DateTime<Utc>,
    delivery_attempt: Option<u32>,
    now: DateTime<Utc>,
) -> Option<bool> {
    let mid = message_id.trim();
    if mid.is_empty() {
        return None;
    }
    let doc_id = mid.replace('/', "_");
    let doc = json!({
        "messageId": mid,
        "topic": topic,
        "subscription": subscription,
        "handler": handler,
        "publishedAt": published_at.to_rfc3339(),
        "deliveryAttempt": delivery_attempt,
        "firstSeenAt": now.to_rfc3339(),
        "lastSeenAt": now.to_rfc3339(),
        "seenCount": 1,
    });
    match store.create(DELIVERIES_COLLECTION, &doc_id, doc).await {
        Ok(()) => Some(false),
        Err(crate::error::PlatformError::AlreadyExists(_)) => {
            let now_iso = now.to_rfc3339();
            let topic = topic.to_string();
            let subscription = subscription.to_string();
            let handler = handler.to_string();
            let result = store
                .run_transaction(
                    DELIVERIES_COLLECTION,
                    &doc_id,
                    Box::new(move |existing| {
                        let mut map = existing.and_then(|v| v.as_object().cloned()).unwrap_or_default();
                        let seen = map.get("seenCount").and_then(Value::as_i64).unwrap_or(0) + 1;
                        map.insert("seenCount".into(), json!(seen));
                        map.insert("lastSeenAt".into(), json!(now_iso));
                        map.insert("lastTopic".into(), json!(topic));
                        map.insert("lastSubscription".into(), json!(subscription));
                        map.insert("lastHandler".into(), json!(handler));
                        Ok(Value::Object(map))
                    }),
                )
                .await;
            if result.is_ok() {
                Some(true)
            } else {
                None
            }
        }
        Err(_) => None,
    }
}
