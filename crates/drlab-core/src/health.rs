use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one health probe against an endpoint.
///
/// Produced by the health prober, consumed at the orchestrator's decision
/// points; not persisted beyond the current polling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthVerdict {
    /// When the probe ran, in UTC.
    pub checked: DateTime<Utc>,
    /// Whether the endpoint answered with a 2xx status.
    pub healthy: bool,
    /// Consecutive failed probes, including this one if it failed.
    pub consecutive_failures: u32,
}

impl HealthVerdict {
    /// Whether the target counts as down under the given threshold.
    #[must_use]
    pub fn is_down(&self, failure_threshold: u32) -> bool {
        !self.healthy && self.consecutive_failures >= failure_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_requires_threshold() {
        let verdict = HealthVerdict {
            checked: Utc::now(),
            healthy: false,
            consecutive_failures: 1,
        };
        assert!(!verdict.is_down(2));
        assert!(verdict.is_down(1));

        let healthy = HealthVerdict {
            checked: Utc::now(),
            healthy: true,
            consecutive_failures: 0,
        };
        assert!(!healthy.is_down(1));
    }
}
