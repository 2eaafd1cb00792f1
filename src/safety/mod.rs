//! Safety gating: startup refusal (C6) and the always-paper broker
//! capability.

pub mod broker_gate;
pub mod gate;

pub use broker_gate::{BrokerGate, BrokerGateError};
pub use gate::{evaluate_startup_gate, refuse_startup, GateExpectations, StartupGateResult};
