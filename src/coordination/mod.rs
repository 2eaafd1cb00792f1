//! Coordination Layer for 24/7 System Operation
//!
//! Ctrl-c-driven graceful shutdown, broadcast to every long-running
//! subsystem (the execution agent's follower loop, the watchdog's
//! periodic check) so they stop between units of work instead of mid-write.

pub mod shutdown;

pub use shutdown::{GracefulShutdown, ShutdownSignal};
