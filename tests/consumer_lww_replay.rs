//! S5 — last-write-wins upsert: repeated application of the same event
//! time is a no-op, an older event is stale-ignored, a newer event wins.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use tradeguard::consumer::{ConsumerWriter, SourceInfo, UpsertOutcome};
use tradeguard::persistence::document_store::InMemoryDocumentStore;
use tradeguard::DocumentStore;

fn source(message_id: &str, published_at: chrono::DateTime<Utc>) -> SourceInfo {
    SourceInfo {
        topic: "trade-signals".to_string(),
        message_id: message_id.to_string(),
        published_at,
    }
}

#[tokio::test]
async fn repeated_same_time_application_is_stable_then_stale_then_newer_wins() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let writer = ConsumerWriter::new(store.clone());

    let t1 = Utc::now();
    let t0 = t1 - ChronoDuration::seconds(30);
    let t2 = t1 + ChronoDuration::seconds(30);

    // Apply (pub=T1, mid=m1) ten times: one final state equal to the first application.
    let mut last_outcome = None;
    let mut first_applied = None;
    for _ in 0..10 {
        let src = source("m1", t1);
        let outcome = writer
            .upsert_trade_signal("docX", Some("docX"), t1, Some("SPY"), Some("momentum"), Some("BUY"), json!({"seq": 1}), &src, None)
            .await
            .unwrap();
        last_outcome = Some(outcome);
        if first_applied.is_none() {
            first_applied = store.get("trade_signals", "docX").await.unwrap();
        }
    }
    assert_eq!(last_outcome, Some(UpsertOutcome::Applied));
    let after_t1 = store.get("trade_signals", "docX").await.unwrap().unwrap();
    assert_eq!(Some(after_t1.clone()), first_applied, "repeated application of the same event converges to the first state");
    assert_eq!(after_t1["eventTime"], json!(t1.to_rfc3339()));

    // Apply (pub=T0, mid=m0) afterwards: reason stale_event_ignored, state unchanged.
    let src0 = source("m0", t0);
    let outcome0 = writer
        .upsert_trade_signal("docX", Some("docX"), t0, Some("SPY"), Some("momentum"), Some("SELL"), json!({"seq": "stale"}), &src0, None)
        .await
        .unwrap();
    assert_eq!(outcome0, UpsertOutcome::StaleIgnored);
    let after_stale = store.get("trade_signals", "docX").await.unwrap().unwrap();
    assert_eq!(after_stale["eventTime"], json!(t1.to_rfc3339()), "state unchanged by a stale event");

    // Apply (pub=T2, mid=m2): state updates to T2 payload.
    let src2 = source("m2", t2);
    let outcome2 = writer
        .upsert_trade_signal("docX", Some("docX"), t2, Some("SPY"), Some("momentum"), Some("BUY"), json!({"seq": "newest"}), &src2, None)
        .await
        .unwrap();
    assert_eq!(outcome2, UpsertOutcome::Applied);
    let after_t2 = store.get("trade_signals", "docX").await.unwrap().unwrap();
    assert_eq!(after_t2["eventTime"], json!(t2.to_rfc3339()));
    assert_eq!(after_t2["data"]["seq"], json!("newest"));
}
