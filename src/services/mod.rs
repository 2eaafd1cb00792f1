//! Ambient read-only health/metrics surface (SPEC_FULL §10.3 `serve`
//! subcommand), optional and separate from the trading-relevant subsystems.

pub mod health;

pub use health::{HealthServer, HealthState};
