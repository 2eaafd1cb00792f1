//! Subcommand surface (ambient stack, SPEC_FULL §10.3): one CLI binary
//! selects which subsystem to run, matching the teacher's `clap` derive
//! `Cli`/`Commands` pattern but re-pointed at this crate's own subsystems.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tradeguard", version, about = "Observe-only multi-agent trading platform")]
pub struct Cli {
    /// Directory or file holding layered TOML configuration.
    #[arg(long, global = true, default_value = "config")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Evaluates the startup safety gate against the process environment
    /// and exits non-zero with a structured refusal line if it fails.
    GateCheck,

    /// Runs the NDJSON-follow execution agent loop (C8) until signaled.
    ExecutionAgent {
        /// Overrides `execution_agent.proposals_path`.
        #[arg(long)]
        proposals_path: Option<PathBuf>,
        /// Start tailing from the beginning of the file instead of the end.
        #[arg(long)]
        from_start: bool,
    },

    /// Processes a file of NDJSON Pub/Sub-shaped deliveries through the
    /// consumer core (C11) against an in-memory document store.
    ConsumerRun {
        /// Path to a file of one JSON delivery object per line:
        /// `{"message_id", "subscription", "published_at", "attributes", "payload"}`.
        messages_path: PathBuf,
    },

    /// Runs the three trade-anomaly detectors (C13) over a file of recent
    /// shadow trades and trips the kill-switch document on a halting hit.
    WatchdogCheck {
        /// Path to a JSON array of `ShadowTrade` records, newest first.
        trades_path: PathBuf,
        tenant_id: String,
        #[arg(long, default_value_t = 0.0)]
        spy_net_gex: f64,
        #[arg(long, default_value = "neutral")]
        market_bias: String,
    },

    /// Packages a strategy and runs one batch of market events through it
    /// in a sandboxed subprocess (C12), printing collected order intents.
    SandboxRun {
        strategy_source: PathBuf,
        events_path: PathBuf,
        #[arg(long, default_value = "user_strategy.py")]
        entrypoint: String,
        #[arg(long)]
        guest_program: String,
        #[arg(long)]
        guest_arg: Vec<String>,
    },

    /// Explains the most recently recorded option proposal (C14): why it
    /// was created, which contract it selected, and whether it executed.
    /// Read-only.
    ObserverExplain {
        #[arg(long, default_value = "audit_artifacts")]
        audit_dir: PathBuf,
        #[arg(long, default_value = "audit_artifacts/execution_decisions")]
        decisions_dir: PathBuf,
        /// Print the JSON form instead of the default human-readable text.
        #[arg(long)]
        json: bool,
    },

    /// Runs the optional read-only health/metrics HTTP surface until
    /// signaled (`/healthz`, `/readyz`, `/metrics`). Does not touch any
    /// trading state.
    Serve {
        /// Overrides `health_port`.
        #[arg(long)]
        port: Option<u16>,
    },
}
