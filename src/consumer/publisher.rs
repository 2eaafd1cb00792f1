//! Bounded retry with full-jitter exponential backoff for outbound publish
//! calls (C11.9). Retryable/non-retryable classification follows the
//! standard gRPC status taxonomy the upstream Pub/Sub client surfaces.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Unavailable,
    DeadlineExceeded,
    Aborted,
    Internal,
    ResourceExhausted,
    Unknown,
    InvalidArgument,
    PermissionDenied,
    Unauthenticated,
    FailedPrecondition,
    NotFound,
    AlreadyExists,
}

impl StatusCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StatusCode::Unavailable
                | StatusCode::DeadlineExceeded
                | StatusCode::Aborted
                | StatusCode::Internal
                | StatusCode::ResourceExhausted
                | StatusCode::Unknown
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Full-jitter backoff: `delay = random(0, min(max_delay, base * 2^attempt))`.
    /// `attempt` is zero-based (the delay *before* the next retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(32));
        let capped = exp.min(self.max_delay.as_millis());
        if capped == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(0..=capped);
        Duration::from_millis(jittered as u64)
    }
}

/// Runs `op` up to `policy.max_attempts` times, classifying each failure via
/// `classify` and stopping immediately on a non-retryable one.
pub async fn retry_with_backoff<T, E, F, Fut, C>(policy: &RetryPolicy, mut op: F, classify: C) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    C: Fn(&E) -> StatusCode,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let code = classify(&e);
                if !code.is_retryable() || attempt + 1 >= policy.max_attempts {
                    return Err(e);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}
