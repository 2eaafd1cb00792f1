//! Last-write-wins upsert transactions for the three materialized
//! collections (C11.5–C11.7): market ticks, 1-minute bars, trade signals,
//! plus the `ops_services` status document with its own dedupe+LWW
//! combination (C11.8).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::persistence::document_store::DocumentStore;

use super::dedupe::{ensure_event_not_applied, IdempotencyStore, ReplayContext};

/// Identifies the Pub/Sub delivery an upsert is attributed to, carried into
/// the stored document for audit and for LWW comparisons on replay.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub topic: String,
    pub message_id: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    StaleIgnored,
    ReplaySkipped,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Applied => "applied",
            UpsertOutcome::StaleIgnored => "stale_event_ignored",
            UpsertOutcome::ReplaySkipped => "already_applied_noop",
        }
    }
}

fn parse_rfc3339(v: Option<&Value>) -> Option<DateTime<Utc>> {
    super::ordering::parse_ts(v)
}

fn max_dt(values: &[Option<DateTime<Utc>>]) -> Option<DateTime<Utc>> {
    values.iter().flatten().copied().max()
}

/// Keeps a previously-stored timestamp from being clobbered by a null in
/// the incoming doc — the incoming write only *adds* information.
fn protect_existing_timestamps(existing: &Value, incoming: &mut Value) {
    let Some(incoming_map) = incoming.as_object_mut() else {
        return;
    };
    let existing_map = existing.as_object();
    for key in ["publishedAt", "producedAt", "eventTime"] {
        let is_null_or_absent = incoming_map.get(key).map(Value::is_null).unwrap_or(true);
        if is_null_or_absent {
            if let Some(v) = existing_map.and_then(|m| m.get(key)).cloned() {
                incoming_map.insert(key.to_string(), v);
            }
        }
    }
}

pub struct ConsumerWriter {
    store: Arc<dyn DocumentStore>,
}

impl ConsumerWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Generic stale-protected upsert shared by market ticks, bars, and
    /// trade signals: newest `event_time` wins, a replay's applied-events
    /// marker (if any) is checked first.
    async fn upsert_event_doc(
        &self,
        collection: &str,
        doc_id: &str,
        event_time: DateTime<Utc>,
        doc: Value,
        replay: Option<&ReplayContext>,
        replay_dedupe_key: &str,
        message_id: &str,
    ) -> Result<UpsertOutcome> {
        if let Some(replay) = replay {
            let (may_proceed, _) =
                ensure_event_not_applied(self.store.as_ref(), Some(replay), replay_dedupe_key, event_time, message_id)
                    .await?;
            if !may_proceed {
                return Ok(UpsertOutcome::ReplaySkipped);
            }
        }

        let doc_id_owned = doc_id.to_string();
        let outcome = self
            .store
            .run_transaction(
                collection,
                doc_id,
                Box::new(move |existing| {
                    let existing_max = existing.as_ref().and_then(|e| {
                        let source_pub = e.get("source").and_then(|s| s.get("publishedAt"));
                        max_dt(&[
                            parse_rfc3339(e.get("eventTime")),
                            parse_rfc3339(e.get("producedAt")),
                            parse_rfc3339(e.get("publishedAt")),
                            parse_rfc3339(source_pub),
                        ])
                    });

                    if let Some(existing_max) = existing_max {
                        if event_time < existing_max {
                            // Signal staleness by echoing the existing doc
                            // back unchanged, tagged for the caller to read.
                            let mut echoed = existing.unwrap();
                            if let Some(map) = echoed.as_object_mut() {
                                map.insert("_staleIgnored".into(), json!(true));
                            }
                            return Ok(echoed);
                        }
                    }

                    let mut doc = doc;
                    if let Some(existing) = &existing {
                        protect_existing_timestamps(existing, &mut doc);
                    }
                    if let Some(map) = doc.as_object_mut() {
                        map.insert("docId".into(), json!(doc_id_owned));
                    }
                    Ok(doc)
                }),
            )
            .await?;

        if outcome.get("_staleIgnored").and_then(Value::as_bool).unwrap_or(false) {
            Ok(UpsertOutcome::StaleIgnored)
        } else {
            Ok(UpsertOutcome::Applied)
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_market_tick(
        &self,
        doc_id: &str,
        event_id: Option<&str>,
        event_time: DateTime<Utc>,
        produced_at: Option<DateTime<Utc>>,
        published_at: Option<DateTime<Utc>>,
        symbol: Option<&str>,
        data: Value,
        source: &SourceInfo,
        replay: Option<&ReplayContext>,
    ) -> Result<UpsertOutcome> {
        let doc = json!({
            "docId": doc_id,
            "eventId": event_id,
            "symbol": symbol,
            "eventTime": event_time.to_rfc3339(),
            "producedAt": produced_at.map(|t| t.to_rfc3339()),
            "publishedAt": published_at.map(|t| t.to_rfc3339()),
            "data": data,
            "lastAppliedMessageId": source.message_id,
            "lastAppliedPublishedAt": source.published_at.to_rfc3339(),
            "source": {
                "topic": source.topic,
                "messageId": source.message_id,
                "publishedAt": source.published_at.to_rfc3339(),
            },
        });
        let dedupe_key = event_id.unwrap_or(doc_id);
        self.upsert_event_doc("market_ticks", doc_id, event_time, doc, replay, dedupe_key, &source.message_id)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_market_bar_1m(
        &self,
        doc_id: &str,
        event_id: Option<&str>,
        event_time: DateTime<Utc>,
        symbol: Option<&str>,
        timeframe: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        data: Value,
        source: &SourceInfo,
        replay: Option<&ReplayContext>,
    ) -> Result<UpsertOutcome> {
        let doc = json!({
            "docId": doc_id,
            "eventId": event_id,
            "symbol": symbol,
            "timeframe": timeframe.unwrap_or("1m"),
            "start": start.map(|t| t.to_rfc3339()),
            "end": end.map(|t| t.to_rfc3339()),
            "eventTime": event_time.to_rfc3339(),
            "data": data,
            "lastAppliedMessageId": source.message_id,
            "lastAppliedPublishedAt": source.published_at.to_rfc3339(),
            "source": {
                "topic": source.topic,
                "messageId": source.message_id,
                "publishedAt": source.published_at.to_rfc3339(),
            },
        });
        let dedupe_key = event_id.unwrap_or(doc_id);
        self.upsert_event_doc("market_bars_1m", doc_id, event_time, doc, replay, dedupe_key, &source.message_id)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_trade_signal(
        &self,
        doc_id: &str,
        event_id: Option<&str>,
        event_time: DateTime<Utc>,
        symbol: Option<&str>,
        strategy: Option<&str>,
        action: Option<&str>,
        data: Value,
        source: &SourceInfo,
        replay: Option<&ReplayContext>,
    ) -> Result<UpsertOutcome> {
        let doc = json!({
            "docId": doc_id,
            "eventId": event_id,
            "symbol": symbol,
            "strategy": strategy,
            "action": action,
            "eventTime": event_time.to_rfc3339(),
            "data": data,
            "lastAppliedMessageId": source.message_id,
            "lastAppliedPublishedAt": source.published_at.to_rfc3339(),
            "source": {
                "topic": source.topic,
                "messageId": source.message_id,
                "publishedAt": source.published_at.to_rfc3339(),
            },
        });
        let dedupe_key = event_id.unwrap_or(doc_id);
        self.upsert_event_doc("trade_signals", doc_id, event_time, doc, replay, dedupe_key, &source.message_id)
            .await
    }

    /// Combines message-once dedupe, an optional replay check, and the
    /// status-aware LWW write into `ops_services/{service_id}` (C11.8).
    #[allow(clippy::too_many_arguments)]
    pub async fn dedupe_and_upsert_ops_service(
        &self,
        idempotency: &IdempotencyStore,
        message_id: &str,
        replay: Option<&ReplayContext>,
        replay_dedupe_key: Option<&str>,
        service_id: &str,
        env: &str,
        status: &str,
        last_heartbeat_at: Option<DateTime<Utc>>,
        version: &str,
        region: &str,
        updated_at: DateTime<Utc>,
        source: &SourceInfo,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let first_time = idempotency
            .begin(
                message_id,
                json!({
                    "kind": "ops_services",
                    "targetDoc": format!("ops_services/{service_id}"),
                    "sourceTopic": source.topic,
                    "sourcePublishedAt": source.published_at.to_rfc3339(),
                }),
                now,
            )
            .await?;
        if !first_time {
            return Ok(UpsertOutcome::ReplaySkipped);
        }

        if let Some(replay) = replay {
            let dedupe_key = replay_dedupe_key.unwrap_or(message_id);
            let (may_proceed, _) =
                ensure_event_not_applied(self.store.as_ref(), Some(replay), dedupe_key, updated_at, message_id)
                    .await?;
            if !may_proceed {
                return Ok(UpsertOutcome::ReplaySkipped);
            }
        }

        let service_id_owned = service_id.to_string();
        let env_owned = env.to_string();
        let status_owned = status.to_string();
        let version_owned = version.to_string();
        let region_owned = region.to_string();
        let source = source.clone();
        let updated_at_iso = updated_at.to_rfc3339();
        let last_heartbeat_iso = last_heartbeat_at.map(|t| t.to_rfc3339());

        let outcome = self
            .store
            .run_transaction(
                "ops_services",
                service_id,
                Box::new(move |existing| {
                    let existing_max = existing.as_ref().and_then(|e| {
                        let source_pub = e.get("source").and_then(|s| s.get("publishedAt"));
                        max_dt(&[
                            parse_rfc3339(e.get("lastHeartbeatAt")),
                            parse_rfc3339(e.get("updatedAt")),
                            parse_rfc3339(source_pub),
                        ])
                    });
                    let incoming_eff = max_dt(&[Some(updated_at), last_heartbeat_at, Some(source.published_at)])
                        .unwrap_or(updated_at);

                    if let Some(existing_max) = existing_max {
                        if incoming_eff < existing_max {
                            let mut echoed = existing.unwrap();
                            if let Some(map) = echoed.as_object_mut() {
                                map.insert("_staleIgnored".into(), json!(true));
                            }
                            return Ok(echoed);
                        }
                    }

                    let prev_status = existing
                        .as_ref()
                        .and_then(|e| e.get("status"))
                        .and_then(Value::as_str)
                        .map(normalize_ops_service_status)
                        .map(|(s, _)| s)
                        .unwrap_or_else(|| "unknown".to_string());
                    let (mut next_status, raw_status) = normalize_ops_service_status(&status_owned);
                    if !transition_allowed(&prev_status, &next_status) {
                        next_status = prev_status.clone();
                    }
                    if next_status == "unknown" && prev_status != "unknown" {
                        next_status = prev_status;
                    }

                    Ok(json!({
                        "serviceId": service_id_owned,
                        "env": env_owned,
                        "status": next_status,
                        "statusRaw": raw_status,
                        "lastHeartbeatAt": last_heartbeat_iso,
                        "version": version_owned,
                        "region": region_owned,
                        "updatedAt": incoming_eff.to_rfc3339(),
                        "source": {
                            "topic": source.topic,
                            "messageId": source.message_id,
                            "publishedAt": source.published_at.to_rfc3339(),
                        },
                    }))
                }),
            )
            .await?;

        idempotency.mark_done(message_id, now).await?;

        if outcome.get("_staleIgnored").and_then(Value::as_bool).unwrap_or(false) {
            Ok(UpsertOutcome::StaleIgnored)
        } else {
            Ok(UpsertOutcome::Applied)
        }
    }
}

const HEALTHY: &[&str] = &["ok", "okay", "healthy", "running", "up", "online", "alive", "serving", "ready"];
const DEGRADED: &[&str] = &["degraded", "warn", "warning", "partial", "slow", "lagging"];
const DOWN: &[&str] = &[
    "down", "offline", "error", "failed", "failure", "fatal", "critical", "unhealthy", "crashloop",
];
const MAINTENANCE: &[&str] = &["maintenance", "maint", "draining", "paused", "pause"];
const UNKNOWN: &[&str] = &["unknown", "n/a", "na", "none", "null", "undefined", "?"];

/// Maps a free-form upstream status string onto the canonical five-value
/// set, returning `(canonical, raw)`. Unrecognized values map to `unknown`
/// rather than being rejected — this is a status board, not a validator.
fn normalize_ops_service_status(raw: &str) -> (String, String) {
    let raw_owned = raw.to_string();
    let s = raw.trim().to_ascii_lowercase();
    if s.is_empty() {
        return ("unknown".to_string(), raw_owned);
    }
    if HEALTHY.contains(&s.as_str()) {
        return ("healthy".to_string(), raw_owned);
    }
    if DEGRADED.contains(&s.as_str()) {
        return ("degraded".to_string(), raw_owned);
    }
    if DOWN.contains(&s.as_str()) {
        return ("down".to_string(), raw_owned);
    }
    if MAINTENANCE.contains(&s.as_str()) {
        return ("maintenance".to_string(), raw_owned);
    }
    if UNKNOWN.contains(&s.as_str()) {
        return ("unknown".to_string(), raw_owned);
    }
    if ["healthy", "degraded", "down", "unknown", "maintenance"].contains(&s.as_str()) {
        return (s, raw_owned);
    }
    ("unknown".to_string(), raw_owned)
}

/// Refuses only one transition shape: dropping from a known status back to
/// `unknown`, which would otherwise let a malformed heartbeat erase a good
/// status reading.
fn transition_allowed(prev: &str, next: &str) -> bool {
    if prev == next {
        return true;
    }
    if matches!(prev, "healthy" | "degraded" | "down" | "maintenance") && next == "unknown" {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::document_store::InMemoryDocumentStore;

    fn source(msg: &str, published_at: DateTime<Utc>) -> SourceInfo {
        SourceInfo {
            topic: "trade-signals".into(),
            message_id: msg.into(),
            published_at,
        }
    }

    #[tokio::test]
    async fn upsert_trade_signal_applies_first_write() {
        let writer = ConsumerWriter::new(Arc::new(InMemoryDocumentStore::new()));
        let now = Utc::now();
        let outcome = writer
            .upsert_trade_signal(
                "doc-1",
                Some("evt-1"),
                now,
                Some("SPY"),
                Some("scalper"),
                Some("BUY"),
                json!({"qty": 1}),
                &source("m1", now),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Applied);
    }

    #[tokio::test]
    async fn upsert_trade_signal_ignores_stale_event() {
        let writer = ConsumerWriter::new(Arc::new(InMemoryDocumentStore::new()));
        let now = Utc::now();
        let earlier = now - chrono::Duration::minutes(5);
        writer
            .upsert_trade_signal("doc-1", Some("evt-1"), now, None, None, None, json!({}), &source("m1", now), None)
            .await
            .unwrap();
        let outcome = writer
            .upsert_trade_signal(
                "doc-1",
                Some("evt-2"),
                earlier,
                None,
                None,
                None,
                json!({}),
                &source("m2", earlier),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::StaleIgnored);
    }

    #[test]
    fn status_normalization_maps_synonyms() {
        assert_eq!(normalize_ops_service_status("RUNNING").0, "healthy");
        assert_eq!(normalize_ops_service_status("crashloop").0, "down");
        assert_eq!(normalize_ops_service_status("bogus").0, "unknown");
    }

    #[test]
    fn transition_refuses_dropping_to_unknown() {
        assert!(!transition_allowed("healthy", "unknown"));
        assert!(transition_allowed("unknown", "healthy"));
        assert!(transition_allowed("healthy", "down"));
    }

    #[tokio::test]
    async fn ops_service_dedupe_rejects_replayed_message() {
        let backing = Arc::new(InMemoryDocumentStore::new());
        let writer = ConsumerWriter::new(backing.clone());
        let idempotency = IdempotencyStore::new(backing, chrono::Duration::hours(24));
        let now = Utc::now();
        let src = source("m1", now);
        let first = writer
            .dedupe_and_upsert_ops_service(
                &idempotency,
                "m1",
                None,
                None,
                "svc-1",
                "prod",
                "healthy",
                Some(now),
                "1.0.0",
                "us",
                now,
                &src,
                now,
            )
            .await
            .unwrap();
        assert_eq!(first, UpsertOutcome::Applied);

        let second = writer
            .dedupe_and_upsert_ops_service(
                &idempotency,
                "m1",
                None,
                None,
                "svc-1",
                "prod",
                "down",
                Some(now),
                "1.0.0",
                "us",
                now,
                &src,
                now,
            )
            .await
            .unwrap();
        assert_eq!(second, UpsertOutcome::ReplaySkipped);
    }
}
