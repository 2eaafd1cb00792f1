use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetySnapshot {
    pub kill_switch: bool,
    pub marketdata_fresh: bool,
    #[serde(default)]
    pub marketdata_last_ts: Option<DateTime<Utc>>,
    pub agent_mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDecision {
    #[serde(default = "Uuid::new_v4")]
    pub decision_id: Uuid,
    #[serde(default = "Utc::now")]
    pub decided_at_utc: DateTime<Utc>,
    pub proposal_id: Uuid,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub agent_name: String,
    pub agent_role: String,
    pub decision: Decision,
    pub reject_reason_codes: Vec<String>,
    pub notes: String,
    pub recommended_order: serde_json::Value,
    pub safety_snapshot: SafetySnapshot,
}
