//! Idempotent shadow (simulated) option fill execution and storage (C10).

pub mod executor;
pub mod store;

pub use executor::{ExecutionOutcome, ShadowIntent, ShadowOptionExecutor};
pub use store::{stable_uuid_from_key, ShadowOptionTradeStore};
