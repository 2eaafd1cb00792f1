//! Sandboxed strategy execution (C12): NDJSON protocol, bundle packaging,
//! a process transport, and the host-side run lifecycle.

pub mod bundle;
pub mod protocol;
pub mod runner;
pub mod transport;

pub use bundle::{create_strategy_bundle, BundleManifest, StrategyBundle};
pub use protocol::{is_valid_sandbox_id, parse_order_intent, MarketEvent, OrderIntent, ProtocolError, PROTOCOL_VERSION};
pub use runner::{market_event_now, run_batch, SandboxConfig};
pub use transport::{SandboxTransport, SubprocessTransport};
