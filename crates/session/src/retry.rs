//! Bounded retry with per-attempt timeout and exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};
use tryon_config::FetchConfig;
use tryon_core::error::{FetchError, FetchFailure};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            initial_backoff: Duration::from_millis(config.backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails with a non-retryable cause, or the
    /// attempts are used up.
    pub async fn run<T, F, Fut>(&self, source_ref: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchFailure>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let cause = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        info!(source = source_ref, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(cause)) => cause,
                Err(_) => FetchFailure::Timeout {
                    timeout_ms: self.attempt_timeout.as_millis() as u64,
                },
            };

            warn!(
                source = source_ref,
                attempt,
                total = max_attempts,
                error = %cause,
                "Fetch attempt failed"
            );

            if attempt >= max_attempts || !cause.is_retryable() {
                return Err(FetchError {
                    source_ref: source_ref.to_string(),
                    attempts: attempt,
                    last_cause: cause,
                });
            }
            tokio::time::sleep(self.backoff_after(attempt)).await;
        }
    }
}
