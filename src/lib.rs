pub mod config;
pub mod consumer;
pub mod coordination;
pub mod envelope;
pub mod error;
pub mod execution;
pub mod explain;
pub mod freshness;
pub mod observer;
pub mod options;
pub mod persistence;
pub mod proposals;
pub mod safety;
pub mod sandbox;
pub mod services;
pub mod shadow;
pub mod subjects;
pub mod watchdog;

pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use error::{PlatformError, Result};
pub use persistence::{DocumentStore, InMemoryDocumentStore};
