//! Execution decision pipeline: pure decider (C7) and the NDJSON-follow
//! execution agent loop (C8).

pub mod agent;
pub mod decider;
pub mod models;

pub use agent::{build_safety_snapshot, run, ExecutionAgentConfig};
pub use decider::decide_execution;
pub use models::{Decision, ExecutionDecision, SafetySnapshot};
