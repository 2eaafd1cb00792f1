//! NDJSON wire protocol between the host and a sandboxed strategy process
//! (C12.1). One JSON object per line, UTF-8, `\n`-terminated.
//!
//! Host -> guest: `market_event`, `shutdown`.
//! Guest -> host: `order_intent`, `log`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "v1";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("field {0} must match the sandbox id pattern")]
    InvalidId(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocol(String),
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),
    #[error("malformed field {0}: {1}")]
    MalformedField(String, String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Matches `^[a-zA-Z0-9][a-zA-Z0-9_\-]{0,127}$` without pulling in a regex
/// dependency: starts alphanumeric, then up to 127 alphanumeric/`_`/`-`.
pub fn is_valid_sandbox_id(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    let rest: Vec<char> = chars.collect();
    if rest.len() > 127 {
        return false;
    }
    rest.iter().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub protocol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub event_id: String,
    pub ts: String,
    pub symbol: String,
    pub source: String,
    pub payload: Value,
}

impl MarketEvent {
    pub fn new(event_id: impl Into<String>, ts: impl Into<String>, symbol: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            protocol: PROTOCOL_VERSION.to_string(),
            kind: "market_event".to_string(),
            event_id: event_id.into(),
            ts: ts.into(),
            symbol: symbol.into(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownMessage {
    pub protocol: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for ShutdownMessage {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_VERSION.to_string(),
            kind: "shutdown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub protocol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub intent_id: String,
    pub event_id: String,
    pub ts: String,
    pub symbol: String,
    pub side: String,
    pub qty: f64,
    pub order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub protocol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ts: String,
    pub level: String,
    pub message: String,
}

/// Validates and parses a guest-emitted `order_intent` line. This is the
/// only channel through which a sandboxed strategy can cause a real-world
/// effect, so every field is checked strictly rather than defaulted.
pub fn parse_order_intent(value: &Value) -> Result<OrderIntent, ProtocolError> {
    let protocol = require_str(value, "protocol")?;
    if protocol != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedProtocol(protocol));
    }
    let kind = require_str(value, "type")?;
    if kind != "order_intent" {
        return Err(ProtocolError::UnsupportedType(kind));
    }
    let intent_id = require_id(value, "intent_id")?;
    let event_id = require_id(value, "event_id")?;
    let ts = require_str(value, "ts")?;
    let symbol = require_str(value, "symbol")?;
    let side = require_str(value, "side")?;
    if side != "buy" && side != "sell" {
        return Err(ProtocolError::MalformedField("side".into(), side));
    }
    let qty = value
        .get("qty")
        .and_then(Value::as_f64)
        .ok_or_else(|| ProtocolError::MissingField("qty".into()))?;
    if qty <= 0.0 {
        return Err(ProtocolError::MalformedField("qty".into(), "must be > 0".into()));
    }
    let order_type = require_str(value, "order_type")?;
    if !["market", "limit", "stop", "stop_limit"].contains(&order_type.as_str()) {
        return Err(ProtocolError::MalformedField("order_type".into(), order_type));
    }
    let limit_price = value.get("limit_price").and_then(Value::as_f64);
    let time_in_force = value.get("time_in_force").and_then(Value::as_str).map(str::to_string);
    if let Some(tif) = &time_in_force {
        if !["day", "gtc", "ioc", "fok"].contains(&tif.as_str()) {
            return Err(ProtocolError::MalformedField("time_in_force".into(), tif.clone()));
        }
    }
    let client_tag = value.get("client_tag").and_then(Value::as_str).map(str::to_string);
    let metadata = value.get("metadata").cloned();

    Ok(OrderIntent {
        protocol,
        kind,
        intent_id,
        event_id,
        ts,
        symbol,
        side,
        qty,
        order_type,
        limit_price,
        time_in_force,
        client_tag,
        metadata,
    })
}

fn require_str(value: &Value, key: &str) -> Result<String, ProtocolError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::MissingField(key.to_string()))
}

fn require_id(value: &Value, key: &str) -> Result<String, ProtocolError> {
    let s = require_str(value, key)?;
    if !is_valid_sandbox_id(&s) {
        return Err(ProtocolError::InvalidId(key.to_string()));
    }
    Ok(s)
}

/// Serializes one NDJSON line (no trailing newline).
pub fn to_ndjson_line<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(value)?)
}
