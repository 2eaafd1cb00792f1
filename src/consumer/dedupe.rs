//! Message-once dedupe and replay-applied markers (C11.3).
//!
//! Two independent guards stack here: [`IdempotencyStore`] claims a Pub/Sub
//! `messageId` exactly once (protects against at-least-once redelivery of
//! the same physical message), and [`ReplayContext`] protects a logical
//! dedupe key (`eventId` or equivalent) against being re-applied by an
//! out-of-band replay run sharing the same consumer/topic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::persistence::document_store::DocumentStore;

use super::ordering::normalize_doc_id;

const DEDUPE_COLLECTION: &str = "ops_dedupe";
const APPLIED_EVENTS_COLLECTION: &str = "ops_applied_events";
const REPLAY_RUNS_COLLECTION: &str = "ops_replay_runs";
const REPLAY_MARKERS_COLLECTION: &str = "ops_replay_markers";

/// Transactional message-once claim store, keyed by Pub/Sub `messageId`.
pub struct IdempotencyStore {
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Claims `message_id`. Returns `true` the first time it is seen and
    /// `false` on every replay — the caller must treat `false` as a no-op.
    pub async fn begin(&self, message_id: &str, doc: Value, now: DateTime<Utc>) -> Result<bool> {
        let first_time = Arc::new(AtomicBool::new(false));
        let flag = first_time.clone();
        let message_id_owned = message_id.to_string();
        let created_at = now.to_rfc3339();
        let expire_at = (now + self.ttl).to_rfc3339();

        self.store
            .run_transaction(
                DEDUPE_COLLECTION,
                message_id,
                Box::new(move |existing| {
                    if let Some(existing) = existing {
                        return Ok(existing);
                    }
                    flag.store(true, Ordering::SeqCst);
                    Ok(json!({
                        "messageId": message_id_owned,
                        "doc": doc,
                        "status": "pending",
                        "createdAt": created_at,
                        "expireAt": expire_at,
                    }))
                }),
            )
            .await?;

        Ok(first_time.load(Ordering::SeqCst))
    }

    /// Marks a claimed message as durably processed.
    pub async fn mark_done(&self, message_id: &str, now: DateTime<Utc>) -> Result<()> {
        let finished_at = now.to_rfc3339();
        self.store
            .run_transaction(
                DEDUPE_COLLECTION,
                message_id,
                Box::new(move |existing| {
                    let mut map = existing.and_then(|v| v.as_object().cloned()).unwrap_or_default();
                    map.insert("status".into(), json!("done"));
                    map.insert("finishedAt".into(), json!(finished_at));
                    Ok(Value::Object(map))
                }),
            )
            .await?;
        Ok(())
    }
}

/// Scopes a replay-applied check to one (run, consumer, topic) triple so
/// the same consumer re-reading history under a fresh `run_id` can tell
/// which events it already applied in a prior pass.
#[derive(Debug, Clone)]
pub struct ReplayContext {
    pub run_id: String,
    pub consumer: String,
    pub topic: String,
}

impl ReplayContext {
    fn applied_event_doc_id(&self, dedupe_key: &str) -> String {
        normalize_doc_id(&format!("{}__{}__{}", self.consumer, self.topic, dedupe_key))
    }

    fn marker_doc_id(&self) -> String {
        normalize_doc_id(&format!("{}__{}", self.consumer, self.topic))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyCheckReason {
    /// No replay context (or empty dedupe key) was supplied — ordinary,
    /// non-replay processing, always allowed to proceed.
    NoDedupeKey,
    NotAppliedYet,
    AlreadyAppliedNoop,
}

impl ApplyCheckReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyCheckReason::NoDedupeKey => "no_dedupe_key",
            ApplyCheckReason::NotAppliedYet => "not_applied_yet",
            ApplyCheckReason::AlreadyAppliedNoop => "already_applied_noop",
        }
    }
}

/// Transactionally checks (and, if absent, claims) the applied-events marker
/// for `dedupe_key` under `replay`. Returns `(may_proceed, reason)`.
pub async fn ensure_event_not_applied(
    store: &dyn DocumentStore,
    replay: Option<&ReplayContext>,
    dedupe_key: &str,
    event_time: DateTime<Utc>,
    message_id: &str,
) -> Result<(bool, ApplyCheckReason)> {
    let Some(replay) = replay else {
        return Ok((true, ApplyCheckReason::NoDedupeKey));
    };
    if dedupe_key.trim().is_empty() {
        return Ok((true, ApplyCheckReason::NoDedupeKey));
    }

    let doc_id = replay.applied_event_doc_id(dedupe_key);
    let first_time = Arc::new(AtomicBool::new(false));
    let flag = first_time.clone();
    let dedupe_key_owned = dedupe_key.to_string();
    let event_time_iso = event_time.to_rfc3339();
    let message_id_owned = message_id.to_string();
    let run_id = replay.run_id.clone();

    store
        .run_transaction(
            APPLIED_EVENTS_COLLECTION,
            &doc_id,
            Box::new(move |existing| {
                if let Some(existing) = existing {
                    return Ok(existing);
                }
                flag.store(true, Ordering::SeqCst);
                Ok(json!({
                    "dedupeKey": dedupe_key_owned,
                    "eventTime": event_time_iso,
                    "messageId": message_id_owned,
                    "appliedByRunId": run_id,
                }))
            }),
        )
        .await?;

    let first = first_time.load(Ordering::SeqCst);
    let reason = if first {
        ApplyCheckReason::NotAppliedYet
    } else {
        ApplyCheckReason::AlreadyAppliedNoop
    };
    Ok((first, reason))
}

/// Records replay-run progress watermarks: `ops_replay_runs/{run_id}` (this
/// run's overall progress) and `ops_replay_markers/{consumer__topic}` (the
/// per-(consumer,topic) high-water mark, observability only).
pub async fn write_replay_marker(
    store: &dyn DocumentStore,
    replay: &ReplayContext,
    event_time: DateTime<Utc>,
    applied: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let run_id = replay.run_id.clone();
    let now_iso = now.to_rfc3339();
    let event_time_iso = event_time.to_rfc3339();

    {
        let now_iso = now_iso.clone();
        let run_id = run_id.clone();
        let applied_copy = applied;
        store
            .run_transaction(
                REPLAY_RUNS_COLLECTION,
                &run_id,
                Box::new(move |existing| {
                    let mut map = existing.and_then(|v| v.as_object().cloned()).unwrap_or_default();
                    map.insert("runId".into(), json!(run_id));
                    map.insert("lastSeenAt".into(), json!(now_iso));
                    if applied_copy {
                        map.insert("lastAppliedAt".into(), json!(now_iso));
                    }
                    Ok(Value::Object(map))
                }),
            )
            .await?;
    }

    let marker_id = replay.marker_doc_id();
    let consumer = replay.consumer.clone();
    let topic = replay.topic.clone();
    store
        .run_transaction(
            REPLAY_MARKERS_COLLECTION,
            &marker_id,
            Box::new(move |existing| {
                let mut map = existing.and_then(|v| v.as_object().cloned()).unwrap_or_default();
                map.insert("consumer".into(), json!(consumer));
                map.insert("topic".into(), json!(topic));
                map.insert("lastSeenAt".into(), json!(now_iso));
                map.insert("lastSeenEventTime".into(), json!(event_time_iso));
                if applied {
                    map.insert("lastAppliedAt".into(), json!(now_iso.clone()));
                    map.insert("lastAppliedEventTime".into(), json!(event_time_iso.clone()));
                }
                Ok(Value::Object(map))
            }),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::document_store::InMemoryDocumentStore;

    #[tokio::test]
    async fn idempotency_store_claims_once() {
        let store = IdempotencyStore::new(Arc::new(InMemoryDocumentStore::new()), Duration::hours(24));
        let now = Utc::now();
        assert!(store.begin("msg-1", json!({}), now).await.unwrap());
        assert!(!store.begin("msg-1", json!({}), now).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_event_not_applied_without_replay_always_proceeds() {
        let store = InMemoryDocumentStore::new();
        let (ok, reason) = ensure_event_not_applied(&store, None, "k", Utc::now(), "m1")
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(reason, ApplyCheckReason::NoDedupeKey);
    }

    #[tokio::test]
    async fn ensure_event_not_applied_rejects_second_application() {
        let store = InMemoryDocumentStore::new();
        let replay = ReplayContext {
            run_id: "run-1".into(),
            consumer: "cloudrun_consumer".into(),
            topic: "trade-signals".into(),
        };
        let now = Utc::now();
        let (first, reason1) = ensure_event_not_applied(&store, Some(&replay), "evt-1", now, "m1")
            .await
            .unwrap();
        assert!(first);
        assert_eq!(reason1, ApplyCheckReason::NotAppliedYet);

        let (second, reason2) = ensure_event_not_applied(&store, Some(&replay), "evt-1", now, "m2")
            .await
            .unwrap();
        assert!(!second);
        assert_eq!(reason2, ApplyCheckReason::AlreadyAppliedNoop);
    }

    #[tokio::test]
    async fn write_replay_marker_updates_watermarks() {
        let store = InMemoryDocumentStore::new();
        let replay = ReplayContext {
            run_id: "run-1".into(),
            consumer: "c".into(),
            topic: "t".into(),
        };
        let now = Utc::now();
        write_replay_marker(&store, &replay, now, true, now).await.unwrap();
        let marker = store.get(REPLAY_MARKERS_COLLECTION, &replay.marker_doc_id()).await.unwrap();
        assert!(marker.is_some());
        assert_eq!(marker.unwrap()["lastAppliedAt"], json!(now.to_rfc3339()));
    }
}
