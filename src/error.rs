use thiserror::Error;

/// Crate-wide error type. Every component returns this (or a narrower
/// error that converts into it at its boundary) so callers never have to
/// match on a dozen unrelated enums.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("aggregated validation failure: {0:?}")]
    ValidationMany(Vec<String>),

    #[error("freshness check failed: {0}")]
    Freshness(String),

    #[error("safety refusal: {0:?}")]
    SafetyRefusal(Vec<String>),

    #[error("transient transport error: {0}")]
    TransientTransport(String),

    #[error("non-retryable transport error: {0}")]
    NonRetryableTransport(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("optimistic transaction conflict after {attempts} attempts on {key}")]
    TransactionConflict { key: String, attempts: u32 },

    #[error("sandbox transport error: {0}")]
    Sandbox(String),

    #[error("subject validation error: {0}")]
    Subject(String),

    #[error("envelope decode error: {0}")]
    Envelope(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PlatformError {
    /// True for errors a retrying caller should back off and retry;
    /// false for errors where retrying cannot possibly help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::TransientTransport(_) | PlatformError::TransactionConflict { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
