//! Wires the consumer core's pieces into one per-message pipeline:
//! resolve routing, dedupe, upsert, and DLQ-sample on drop or failure.
//! Grounded on `original_source/cloudrun_consumer/firestore_writer.py`'s
//! top-level `handle_message` (the orchestration the 150-line handler
//! excerpts for `trade_signals.py`/`ingest_pipelines.py` are called from).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::persistence::document_store::DocumentStore;

use super::dedupe::{IdempotencyStore, ReplayContext};
use super::dlq::maybe_write_sampled_dlq_event;
use super::ordering::{choose_doc_id, ordering_ts};
use super::router::{EventContext, HandlerKind, SchemaRouter};
use super::store::{ConsumerWriter, SourceInfo, UpsertOutcome};

/// One raw Pub/Sub-shaped delivery: message id, publish time, string
/// attributes, and a JSON payload already decoded from the message body.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub message_id: String,
    pub subscription: String,
    pub published_at: DateTime<Utc>,
    pub attributes: HashMap<String, String>,
    pub payload: Value,
}

pub struct ConsumerService {
    store: Arc<dyn DocumentStore>,
    router: SchemaRouter,
    writer: ConsumerWriter,
    idempotency: IdempotencyStore,
    dlq_sample_rate: f64,
    replay: Option<ReplayContext>,
}

impl ConsumerService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        router: SchemaRouter,
        idempotency_ttl: chrono::Duration,
        dlq_sample_rate: f64,
        replay: Option<ReplayContext>,
    ) -> Self {
        Self {
            store: store.clone(),
            router,
            writer: ConsumerWriter::new(store.clone()),
            idempotency: IdempotencyStore::new(store, idempotency_ttl),
            dlq_sample_rate,
            replay,
        }
    }

    /// Processes one delivery end to end. Never returns an error for a
    /// malformed or unroutable message — those are DLQ-sampled and
    /// dropped, matching the original writer's posture of never crashing
    /// the subscriber loop on bad input. Returns the terminal outcome for
    /// observability/tests.
    pub async fn handle_message(&self, msg: &WireMessage, now: DateTime<Utc>) -> Result<UpsertOutcome> {
        let first_time = self
            .idempotency
            .begin(&msg.message_id, msg.payload.clone(), now)
            .await?;
        if !first_time {
            info!(message_id = %msg.message_id, "consumer.message_already_seen");
            return Ok(UpsertOutcome::ReplaySkipped);
        }

        let event_type = self.router.resolve_event_type(&msg.attributes, &msg.payload);
        let topic = self.router.resolve_topic(&msg.subscription, &msg.attributes, &msg.payload);
        let event_time = ordering_ts(&msg.payload, msg.published_at);
        let doc_id = choose_doc_id(&msg.payload, &msg.message_id);
        let source = SourceInfo {
            topic: topic.clone(),
            message_id: msg.message_id.clone(),
            published_at: msg.published_at,
        };

        let ctx = EventContext {
            message_id: msg.message_id.clone(),
            topic: topic.clone(),
            schema_version: msg
                .attributes
                .get("schemaVersion")
                .cloned()
                .unwrap_or_else(|| "1".to_string()),
            event_type: event_type.clone(),
            subscription: msg.subscription.clone(),
            attributes: msg.attributes.clone(),
        };

        let Some(kind) = self.router.handler_for(&topic, &event_type, &msg.payload) else {
            warn!(message_id = %msg.message_id, topic, event_type, "consumer.unroutable_message");
            self.sample_to_dlq(&ctx, "none", "unroutable_message", now).await;
            self.idempotency.mark_done(&msg.message_id, now).await?;
            return Ok(UpsertOutcome::ReplaySkipped);
        };

        let outcome = match self.dispatch(kind, &doc_id, event_time, &msg.payload, &source).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(message_id = %msg.message_id, error = %e, "consumer.handler_failed");
                self.sample_to_dlq(&ctx, handler_name(kind), &e.to_string(), now).await;
                self.idempotency.mark_done(&msg.message_id, now).await?;
                return Err(e);
            }
        };

        self.idempotency.mark_done(&msg.message_id, now).await?;
        Ok(outcome)
    }

    async fn sample_to_dlq(&self, ctx: &EventContext, handler: &str, reason: &str, now: DateTime<Utc>) {
        let result = maybe_write_sampled_dlq_event(
            self.store.as_ref(),
            &ctx.message_id,
            &ctx.subscription,
            &ctx.topic,
            handler,
            0,
            reason,
            reason,
            None,
            serde_json::to_value(&ctx.attributes).unwrap_or(Value::Null),
            None,
            self.dlq_sample_rate,
            now,
        )
        .await;
        if let Err(e) = result {
            warn!(error = %e, "consumer.dlq_sample_write_failed");
        }
    }

    async fn dispatch(
        &self,
        kind: HandlerKind,
        doc_id: &str,
        event_time: DateTime<Utc>,
        payload: &Value,
        source: &SourceInfo,
    ) -> Result<UpsertOutcome> {
        let replay = self.replay.as_ref();
        match kind {
            HandlerKind::TradeSignal => {
                self.writer
                    .upsert_trade_signal(
                        doc_id,
                        payload.get("eventId").and_then(Value::as_str),
                        event_time,
                        payload.get("symbol").and_then(Value::as_str),
                        payload.get("strategy").and_then(Value::as_str),
                        payload.get("action").and_then(Value::as_str),
                        payload.clone(),
                        source,
                        replay,
                    )
                    .await
            }
            HandlerKind::MarketData => {
                if payload.get("timeframe").is_some() || payload.get("start").is_some() {
                    self.writer
                        .upsert_market_bar_1m(
                            doc_id,
                            payload.get("eventId").and_then(Value::as_str),
                            event_time,
                            payload.get("symbol").and_then(Value::as_str),
                            payload.get("timeframe").and_then(Value::as_str),
                            super::ordering::parse_ts(payload.get("start")),
                            super::ordering::parse_ts(payload.get("end")),
                            payload.clone(),
                            source,
                            replay,
                        )
                        .await
                } else {
                    self.writer
                        .upsert_market_tick(
                            doc_id,
                            payload.get("eventId").and_then(Value::as_str),
                            event_time,
                            super::ordering::parse_ts(payload.get("producedAt")),
                            Some(source.published_at),
                            payload.get("symbol").and_then(Value::as_str),
                            payload.clone(),
                            source,
                            replay,
                        )
                        .await
                }
            }
            HandlerKind::OpsService | HandlerKind::IngestPipeline => {
                let service_id = payload
                    .get("serviceId")
                    .or_else(|| payload.get("pipelineId"))
                    .or_else(|| payload.get("service"))
                    .or_else(|| payload.get("pipeline"))
                    .and_then(Value::as_str)
                    .unwrap_or(doc_id);
                self.writer
                    .dedupe_and_upsert_ops_service(
                        &self.idempotency,
                        &source.message_id,
                        replay,
                        None,
                        service_id,
                        payload.get("env").and_then(Value::as_str).unwrap_or("unknown"),
                        payload.get("status").and_then(Value::as_str).unwrap_or("unknown"),
                        super::ordering::parse_ts(payload.get("lastHeartbeatAt")),
                        payload.get("version").and_then(Value::as_str).unwrap_or("unknown"),
                        payload.get("region").and_then(Value::as_str).unwrap_or("unknown"),
                        event_time,
                        source,
                        Utc::now(),
                    )
                    .await
            }
        }
    }
}

fn handler_name(kind: HandlerKind) -> &'static str {
    match kind {
        HandlerKind::TradeSignal => "trade_signal",
        HandlerKind::OpsService => "ops_service",
        HandlerKind::IngestPipeline => "ingest_pipeline",
        HandlerKind::MarketData => "market_data",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::document_store::InMemoryDocumentStore;
    use serde_json::json;

    fn service() -> ConsumerService {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        ConsumerService::new(
            store,
            SchemaRouter::new(vec!["1".to_string()], HashMap::new(), "unknown".to_string()),
            chrono::Duration::hours(24),
            1.0,
            None,
        )
    }

    #[tokio::test]
    async fn routes_trade_signal_to_applied_upsert() {
        let svc = service();
        let msg = WireMessage {
            message_id: "m1".into(),
            subscription: "sub-a".into(),
            published_at: Utc::now(),
            attributes: HashMap::new(),
            payload: json!({"eventType": "trade_signal", "eventId": "e1", "symbol": "SPY", "action": "BUY"}),
        };
        let outcome = svc.handle_message(&msg, Utc::now()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Applied);
    }

    #[tokio::test]
    async fn duplicate_message_id_is_replay_skipped() {
        let svc = service();
        let msg = WireMessage {
            message_id: "m1".into(),
            subscription: "sub-a".into(),
            published_at: Utc::now(),
            attributes: HashMap::new(),
            payload: json!({"eventType": "trade_signal", "eventId": "e1", "symbol": "SPY"}),
        };
        svc.handle_message(&msg, Utc::now()).await.unwrap();
        let second = svc.handle_message(&msg, Utc::now()).await.unwrap();
        assert_eq!(second, UpsertOutcome::ReplaySkipped);
    }

    #[tokio::test]
    async fn unroutable_message_is_dropped_without_error() {
        let svc = service();
        let msg = WireMessage {
            message_id: "m1".into(),
            subscription: "sub-a".into(),
            published_at: Utc::now(),
            attributes: HashMap::new(),
            payload: json!({}),
        };
        let outcome = svc.handle_message(&msg, Utc::now()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::ReplaySkipped);
    }
}
