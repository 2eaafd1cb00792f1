//! `BrokerGate` is the typed capability that stands between any
//! execute-mode code path and a real broker call. It cannot be constructed
//! except by [`BrokerGate::acquire`], and acquisition fails unless
//! `EXECUTION_ENABLED=true`, `EXECUTION_CONFIRM=true`, and the configured
//! broker base URL resolves to a host on the paper-endpoint allowlist.
//!
//! This generalizes a permanently-false-unless-everything-lines-up posture
//! into a value that handlers must actually hold, rather than a boolean
//! they could forget to check.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerGateError {
    #[error("EXECUTION_ENABLED is not true")]
    ExecutionNotEnabled,
    #[error("EXECUTION_CONFIRM is not true")]
    ExecutionNotConfirmed,
    #[error("broker base url is not a valid url: {0}")]
    InvalidBaseUrl(String),
    #[error("broker host {host} is not on the paper-endpoint allowlist")]
    HostNotAllowed { host: String },
}

/// Possession of a `BrokerGate` value is the only way execute-mode code
/// may proceed. There is no live-capable constructor: every path here
/// that could succeed still only authorizes the configured paper
/// endpoint.
pub struct BrokerGate {
    base_url: String,
}

impl BrokerGate {
    pub fn acquire(
        execution_enabled: bool,
        execution_confirm: bool,
        base_url: &str,
        allowed_hosts: &[String],
    ) -> Result<Self, BrokerGateError> {
        if !execution_enabled {
            return Err(BrokerGateError::ExecutionNotEnabled);
        }
        if !execution_confirm {
            return Err(BrokerGateError::ExecutionNotConfirmed);
        }
        let parsed = Url::parse(base_url)
            .map_err(|_| BrokerGateError::InvalidBaseUrl(base_url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| BrokerGateError::InvalidBaseUrl(base_url.to_string()))?;
        if !allowed_hosts.iter().any(|h| h == host) {
            return Err(BrokerGateError::HostNotAllowed {
                host: host.to_string(),
            });
        }
        Ok(BrokerGate {
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
