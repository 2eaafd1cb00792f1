//! Canonical agent-to-agent message envelope: alias-tolerant on decode,
//! canonical on encode. Producers disagree on casing (`eventType` vs
//! `event_type`); this type accepts either on the way in and always emits
//! the canonical shape on the way out.

use crate::error::{PlatformError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use uuid::Uuid;

fn utc_now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn default_git_sha() -> String {
    env::var("GIT_SHA")
        .or_else(|_| env::var("GITHUB_SHA"))
        .or_else(|_| env::var("COMMIT_SHA"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "schemaVersion")]
    pub schema_version: i64,
    pub event_type: String,
    pub agent_name: String,
    pub git_sha: String,
    pub ts: String,
    pub payload: Value,
    pub trace_id: String,
}

/// Decode-only shape: every required field accepts the legacy alias as well
/// as the canonical name. Fields absent under every alias fail decode with
/// a named-field error rather than a generic serde message.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "schemaVersion", alias = "schema_version")]
    schema_version: Option<i64>,
    #[serde(alias = "eventType", alias = "type")]
    event_type: Option<String>,
    #[serde(alias = "agentName")]
    agent_name: Option<String>,
    #[serde(alias = "gitSha", alias = "sha")]
    git_sha: Option<String>,
    #[serde(alias = "producedAt")]
    ts: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(alias = "traceId")]
    trace_id: Option<String>,
}

fn allow_legacy_schemaless() -> bool {
    matches!(
        env::var("ALLOW_LEGACY_SCHEMALESS_ENVELOPE")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn require(value: Option<String>, field_name: &str) -> Result<String> {
    match value.map(|s| s.trim().to_string()) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(PlatformError::Envelope(format!(
            "missing required field: {field_name}"
        ))),
    }
}

impl Envelope {
    pub fn new(event_type: &str, agent_name: &str, payload: Value) -> Self {
        Envelope {
            schema_version: 1,
            event_type: event_type.to_string(),
            agent_name: agent_name.to_string(),
            git_sha: default_git_sha(),
            ts: utc_now_iso(),
            payload,
            trace_id: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let raw: RawEnvelope = serde_json::from_slice(data)
            .map_err(|e| PlatformError::Envelope(e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_str_json(data: &str) -> Result<Self> {
        let raw: RawEnvelope =
            serde_json::from_str(data).map_err(|e| PlatformError::Envelope(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnvelope) -> Result<Self> {
        let schema_version = match raw.schema_version {
            Some(v) => v,
            None if allow_legacy_schemaless() => 0,
            None => {
                return Err(PlatformError::Envelope(
                    "missing required field: schemaVersion".to_string(),
                ))
            }
        };

        Ok(Envelope {
            schema_version,
            event_type: require(raw.event_type, "event_type")?,
            agent_name: require(raw.agent_name, "agent_name")?,
            git_sha: require(raw.git_sha, "git_sha")?,
            ts: require(raw.ts, "ts")?,
            payload: raw.payload.unwrap_or_else(|| Value::Object(Default::default())),
            trace_id: raw
                .trace_id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_shape() {
        let env = Envelope::new("marketdata.heartbeat", "marketdata", serde_json::json!({"x": 1}));
        let json = env.to_json().unwrap();
        let decoded = Envelope::from_str_json(&json).unwrap();
        assert_eq!(decoded.event_type, "marketdata.heartbeat");
        assert_eq!(decoded.schema_version, 1);
    }

    #[test]
    fn accepts_legacy_aliases() {
        let json = r#"{
            "schema_version": 1,
            "eventType": "orders.created",
            "agentName": "execution-agent",
            "gitSha": "deadbeef",
            "producedAt": "2024-01-01T00:00:00Z",
            "payload": {"a": 1},
            "traceId": "abc123"
        }"#;
        let env = Envelope::from_str_json(json).unwrap();
        assert_eq!(env.event_type, "orders.created");
        assert_eq!(env.agent_name, "execution-agent");
        assert_eq!(env.trace_id, "abc123");
    }

    #[test]
    fn rejects_missing_schema_version_by_default() {
        let json = r#"{"event_type": "x", "agent_name": "y", "git_sha": "z", "ts": "2024-01-01T00:00:00Z"}"#;
        assert!(Envelope::from_str_json(json).is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let json = r#"{"schemaVersion": 1, "agent_name": "y", "git_sha": "z", "ts": "2024-01-01T00:00:00Z"}"#;
        let err = Envelope::from_str_json(json).unwrap_err();
        assert!(err.to_string().contains("event_type"));
    }
}
