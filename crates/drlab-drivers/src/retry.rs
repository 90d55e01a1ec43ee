use std::future::Future;

use tracing::warn;

use drlab_core::{DrResult, RetryConfig};

/// Reusable bounded-retry policy with exponential backoff.
///
/// Retries only errors classified retryable by
/// [`drlab_core::FailoverError::is_retryable`]; a fatal error or attempt
/// exhaustion returns the last error to the caller.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Builds a policy from retry configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Maximum attempts this policy will make (first try included).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Runs `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `op` is invoked with the 1-based attempt number so callers can record
    /// per-attempt results. `on_attempt_failure` fires after each failed
    /// attempt (retryable or not) before any backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        mut op: F,
        mut on_attempt_failure: impl FnMut(u32, &drlab_core::FailoverError),
    ) -> DrResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DrResult<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    on_attempt_failure(attempt, &err);
                    if !err.is_retryable() || attempt >= self.config.max_attempts {
                        return Err(err);
                    }
                    let backoff = self.config.backoff_for_attempt(attempt - 1);
                    warn!(
                        operation = label,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
