//! Topic/eventType/payload-shape routing to one of the four handler kinds
//! (C11.4).

use std::collections::HashMap;

use serde_json::Value;

/// Metadata carried alongside a single Pub/Sub delivery, independent of its
/// payload — built once per message and threaded through routing and
/// handling.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub message_id: String,
    pub topic: String,
    pub schema_version: String,
    pub event_type: String,
    pub subscription: String,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    TradeSignal,
    OpsService,
    IngestPipeline,
    MarketData,
}

pub struct SchemaRouter {
    supported_versions: Vec<String>,
    subscription_topic_map: HashMap<String, String>,
    default_topic: String,
}

impl SchemaRouter {
    pub fn new(supported_versions: Vec<String>, subscription_topic_map: HashMap<String, String>, default_topic: String) -> Self {
        Self {
            supported_versions,
            subscription_topic_map,
            default_topic,
        }
    }

    pub fn supports_version(&self, version: &str) -> bool {
        self.supported_versions.iter().any(|v| v == version)
    }

    pub fn resolve_topic(&self, subscription: &str, attributes: &HashMap<String, String>, payload: &Value) -> String {
        for key in ["topic", "pubsubTopic", "sourceTopic"] {
            if let Some(v) = attributes.get(key).cloned() {
                if !v.trim().is_empty() {
                    return v;
                }
            }
            if let Some(v) = payload.get(key).and_then(Value::as_str) {
                if !v.trim().is_empty() {
                    return v.to_string();
                }
            }
        }
        if let Some(mapped) = self.subscription_topic_map.get(subscription) {
            return mapped.clone();
        }
        self.default_topic.clone()
    }

    pub fn resolve_event_type(&self, attributes: &HashMap<String, String>, payload: &Value) -> String {
        for key in ["eventType", "type", "kind"] {
            if let Some(v) = attributes.get(key).cloned() {
                if !v.trim().is_empty() {
                    return v;
                }
            }
            if let Some(v) = payload.get(key).and_then(Value::as_str) {
                if !v.trim().is_empty() {
                    return v.to_string();
                }
            }
        }
        "unknown".to_string()
    }

    /// Routes by eventType prefix first, then topic substring, then payload
    /// key hints as a last resort. Returns `None` when nothing matches —
    /// the caller should DLQ-sample and drop.
    pub fn handler_for(&self, topic: &str, event_type: &str, payload: &Value) -> Option<HandlerKind> {
        let t = topic.to_ascii_lowercase();
        let et = event_type.to_ascii_lowercase();

        if et.starts_with("system.") || et.starts_with("ops.") || et.starts_with("service.") {
            return Some(HandlerKind::OpsService);
        }
        if matches!(et.as_str(), "system_event" | "service_status" | "ops_service") {
            return Some(HandlerKind::OpsService);
        }
        if et.starts_with("ingest.") || et.starts_with("pipeline.") {
            return Some(HandlerKind::IngestPipeline);
        }
        if matches!(et.as_str(), "ingest_health" | "pipeline_status" | "ingest_pipeline") {
            return Some(HandlerKind::IngestPipeline);
        }
        if et.starts_with("signal.") || matches!(et.as_str(), "trade_signal" | "signal") {
            return Some(HandlerKind::TradeSignal);
        }
        if et.starts_with("market.") || matches!(et.as_str(), "market_tick" | "market_bar") {
            return Some(HandlerKind::MarketData);
        }

        if ["system", "ops", "service"].iter().any(|x| t.contains(x)) {
            return Some(HandlerKind::OpsService);
        }
        if ["ingest", "pipeline", "health"].iter().any(|x| t.contains(x)) {
            return Some(HandlerKind::IngestPipeline);
        }
        if ["signal", "trade"].iter().any(|x| t.contains(x)) {
            return Some(HandlerKind::TradeSignal);
        }
        if ["market", "tick", "bar"].iter().any(|x| t.contains(x)) {
            return Some(HandlerKind::MarketData);
        }

        let obj = payload.as_object()?;
        if ["service", "serviceName", "component", "app", "service_id"]
            .iter()
            .any(|k| obj.contains_key(*k))
        {
            return Some(HandlerKind::OpsService);
        }
        if ["pipeline", "pipelineName", "ingestPipeline", "pipeline_id"]
            .iter()
            .any(|k| obj.contains_key(*k))
        {
            return Some(HandlerKind::IngestPipeline);
        }
        if ["strategy", "action", "signal_id", "signalId"].iter().any(|k| obj.contains_key(*k)) {
            return Some(HandlerKind::TradeSignal);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn router() -> SchemaRouter {
        SchemaRouter::new(vec!["1".to_string()], HashMap::new(), "unknown".to_string())
    }

    #[test]
    fn event_type_prefix_routes_ops() {
        let r = router();
        assert_eq!(r.handler_for("any-topic", "ops.heartbeat", &json!({})), Some(HandlerKind::OpsService));
    }

    #[test]
    fn topic_substring_routes_ingest() {
        let r = router();
        assert_eq!(
            r.handler_for("ingest-pipeline-health", "unknown", &json!({})),
            Some(HandlerKind::IngestPipeline)
        );
    }

    #[test]
    fn payload_hint_routes_trade_signal() {
        let r = router();
        assert_eq!(
            r.handler_for("misc", "unknown", &json!({"signal_id": "s1"})),
            Some(HandlerKind::TradeSignal)
        );
    }

    #[test]
    fn unroutable_returns_none() {
        let r = router();
        assert_eq!(r.handler_for("misc", "unknown", &json!({})), None);
    }

    #[test]
    fn resolve_topic_prefers_attribute_over_subscription_map() {
        let mut map = HashMap::new();
        map.insert("sub-a".to_string(), "mapped-topic".to_string());
        let r = SchemaRouter::new(vec!["1".to_string()], map, "unknown".to_string());
        let mut attrs = HashMap::new();
        attrs.insert("topic".to_string(), "explicit-topic".to_string());
        assert_eq!(r.resolve_topic("sub-a", &attrs, &json!({})), "explicit-topic");
        assert_eq!(r.resolve_topic("sub-a", &HashMap::new(), &json!({})), "mapped-topic");
    }
}
