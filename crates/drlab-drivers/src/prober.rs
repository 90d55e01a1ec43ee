use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use drlab_core::{DrResult, EndpointCheck, FailoverError, HealthVerdict, ProbeConfig};

/// Polls an endpoint and yields binary healthy/unhealthy verdicts with
/// consecutive-failure counting.
///
/// One bounded GET per probe; transport failures and timeouts count as
/// unhealthy. No retries live here, retry policy belongs to the caller.
pub struct HealthProber {
    checker: Arc<dyn EndpointCheck>,
    timeout: Duration,
    consecutive_failures: Mutex<u32>,
}

impl HealthProber {
    /// Builds a prober over an endpoint checker.
    pub fn new(checker: Arc<dyn EndpointCheck>, config: &ProbeConfig) -> Self {
        Self {
            checker,
            timeout: config.timeout(),
            consecutive_failures: Mutex::new(0),
        }
    }

    /// Probes the endpoint once and updates the failure counter.
    pub async fn probe(&self, endpoint: &str) -> HealthVerdict {
        let healthy = match self.checker.get(endpoint, self.timeout).await {
            Ok(status) => (200..300).contains(&status),
            Err(err) => {
                debug!(endpoint, error = %err, "probe transport failure");
                false
            }
        };

        let mut failures = self.consecutive_failures.lock();
        if healthy {
            *failures = 0;
        } else {
            *failures += 1;
        }

        HealthVerdict {
            checked: Utc::now(),
            healthy,
            consecutive_failures: *failures,
        }
    }

    /// Current consecutive-failure count without probing.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        *self.consecutive_failures.lock()
    }

    /// Resets the failure counter (new polling window).
    pub fn reset(&self) {
        *self.consecutive_failures.lock() = 0;
    }
}

/// `EndpointCheck` backed by a shared `reqwest` client.
pub struct HttpEndpointCheck {
    client: reqwest::Client,
}

impl HttpEndpointCheck {
    /// Builds a checker with a default client.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EndpointCheck for HttpEndpointCheck {
    async fn get(&self, url: &str, timeout: Duration) -> DrResult<u16> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| FailoverError::transport(err.to_string()))?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEndpointCheck;

    #[tokio::test]
    async fn failures_accumulate_and_reset_on_success() {
        let check = Arc::new(MemoryEndpointCheck::with_statuses(vec![503, 503, 200, 500]));
        let prober = HealthProber::new(check, &ProbeConfig::default());

        let v1 = prober.probe("https://primary.example.com/healthz").await;
        assert!(!v1.healthy);
        assert_eq!(v1.consecutive_failures, 1);

        let v2 = prober.probe("https://primary.example.com/healthz").await;
        assert!(v2.is_down(2));

        let v3 = prober.probe("https://primary.example.com/healthz").await;
        assert!(v3.healthy);
        assert_eq!(v3.consecutive_failures, 0);

        let v4 = prober.probe("https://primary.example.com/healthz").await;
        assert_eq!(v4.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn transport_errors_count_as_unhealthy() {
        let check = Arc::new(MemoryEndpointCheck::unreachable());
        let prober = HealthProber::new(check, &ProbeConfig::default());

        let verdict = prober.probe("https://primary.example.com/healthz").await;
        assert!(!verdict.healthy);
        assert_eq!(verdict.consecutive_failures, 1);
        assert_eq!(prober.consecutive_failures(), 1);

        // A new polling window starts from zero.
        prober.reset();
        assert_eq!(prober.consecutive_failures(), 0);
    }
}
