use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, loaded from layered TOML files plus environment
/// variable overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub execution_agent: ExecutionAgentConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub broker_gate: BrokerGateConfig,
    /// Health/explain server port, when the `serve` subcommand is used.
    #[serde(default)]
    pub health_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Expected identity for the startup safety gate. `AGENT_MODE`,
/// `EXECUTION_AGENT_ENABLED`, `BROKER_EXECUTION_ENABLED` and
/// `EXECUTION_ENABLED` always carry their spec-mandated literal values and
/// are not configurable here — only the deployment identity is.
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_repo_id")]
    pub repo_id: String,
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    #[serde(default = "default_agent_role")]
    pub agent_role: String,
}

fn default_repo_id() -> String {
    "trading-platform".to_string()
}
fn default_agent_name() -> String {
    "execution-agent".to_string()
}
fn default_agent_role() -> String {
    "execution".to_string()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            repo_id: default_repo_id(),
            agent_name: default_agent_name(),
            agent_role: default_agent_role(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionAgentConfig {
    /// Path to the NDJSON file of incoming proposals to tail.
    #[serde(default = "default_proposals_path")]
    pub proposals_path: String,
    /// Base directory under which `<date>/decisions.ndjson` is appended.
    #[serde(default = "default_decisions_base_dir")]
    pub decisions_base_dir: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_marketdata_stale_threshold_s")]
    pub marketdata_stale_threshold_s: u64,
}

fn default_proposals_path() -> String {
    "audit_artifacts/proposals.ndjson".to_string()
}
fn default_decisions_base_dir() -> String {
    "audit_artifacts/execution_decisions".to_string()
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_marketdata_stale_threshold_s() -> u64 {
    120
}

impl Default for ExecutionAgentConfig {
    fn default() -> Self {
        Self {
            proposals_path: default_proposals_path(),
            decisions_base_dir: default_decisions_base_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            marketdata_stale_threshold_s: default_marketdata_stale_threshold_s(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_supersede_window_s")]
    pub supersede_window_s: u64,
    #[serde(default = "default_dlq_sample_rate")]
    pub dlq_sample_rate: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_supersede_window_s() -> u64 {
    30
}
fn default_dlq_sample_rate() -> f64 {
    1.0
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_base_delay_ms() -> u64 {
    200
}
fn default_retry_max_delay_ms() -> u64 {
    30_000
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            supersede_window_s: default_supersede_window_s(),
            dlq_sample_rate: default_dlq_sample_rate(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_watchdog_check_interval_s")]
    pub check_interval_s: u64,
    #[serde(default = "default_watchdog_losing_streak_threshold")]
    pub losing_streak_threshold: u32,
    #[serde(default = "default_watchdog_lookback")]
    pub lookback_trades: usize,
}

fn default_watchdog_check_interval_s() -> u64 {
    5
}
fn default_watchdog_losing_streak_threshold() -> u32 {
    5
}
fn default_watchdog_lookback() -> usize {
    50
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval_s: default_watchdog_check_interval_s(),
            losing_streak_threshold: default_watchdog_losing_streak_threshold(),
            lookback_trades: default_watchdog_lookback(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_boot_timeout_ms")]
    pub boot_timeout_ms: u64,
    #[serde(default = "default_sandbox_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_sandbox_boot_timeout_ms() -> u64 {
    5_000
}
fn default_sandbox_call_timeout_ms() -> u64 {
    2_000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            boot_timeout_ms: default_sandbox_boot_timeout_ms(),
            call_timeout_ms: default_sandbox_call_timeout_ms(),
        }
    }
}

/// Always-paper broker gate. `base_url` is checked against `allowed_hosts`
/// by `safety::broker_gate::BrokerGate::acquire` before any execute-mode
/// path can run; it is never sufficient on its own.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerGateConfig {
    #[serde(default = "default_broker_base_url")]
    pub base_url: String,
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

fn default_broker_base_url() -> String {
    "https://paper-api.example.invalid".to_string()
}
fn default_allowed_hosts() -> Vec<String> {
    vec!["paper-api.example.invalid".to_string()]
}

impl Default for BrokerGateConfig {
    fn default() -> Self {
        Self {
            base_url: default_broker_base_url(),
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref();

        let mut builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("execution_agent.poll_interval_ms", 250)?
            .set_default("consumer.max_retries", 5)?;

        if config_path.is_file() {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::from(config_path.join("default.toml")).required(false))
                .add_source(
                    File::from(config_path.join(
                        std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                    ))
                    .required(false),
                );
        }

        builder = builder.add_source(
            Environment::with_prefix("TRADEGUARD")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("broker_gate.allowed_hosts")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_all_paper_safe() {
        let gate = BrokerGateConfig::default();
        assert!(gate.base_url.contains("paper"));
    }

    #[test]
    fn load_from_missing_directory_falls_back_to_defaults() {
        let cfg = AppConfig::load_from("does-not-exist").expect("defaults should be sufficient");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.gate.agent_role, "execution");
    }
}
