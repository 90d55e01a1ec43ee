use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use drlab_core::{ComputeControl, DrResult};

/// Scales the standby service and waits for task health.
///
/// Scaling is asynchronous at the infrastructure layer; `await_healthy`
/// polls the running/healthy count and returns `false` (not an error) on
/// timeout so the caller can accept partial capacity.
pub struct ComputeScaler {
    compute: Arc<dyn ComputeControl>,
    poll_interval: Duration,
}

impl ComputeScaler {
    /// Builds a scaler polling at the given interval.
    pub fn new(compute: Arc<dyn ComputeControl>, poll_interval: Duration) -> Self {
        Self {
            compute,
            poll_interval,
        }
    }

    /// Requests the desired task count.
    pub async fn scale_to(&self, service_ref: &str, desired: u32) -> DrResult<()> {
        info!(service_ref, desired, "scaling standby service");
        self.compute.set_desired_count(service_ref, desired).await
    }

    /// Polls until `desired` tasks are healthy or the timeout elapses.
    ///
    /// Returns the final healthy count alongside whether the target was
    /// met, so a partial scale-up can be recorded precisely.
    pub async fn await_healthy(
        &self,
        service_ref: &str,
        desired: u32,
        timeout: Duration,
    ) -> DrResult<(bool, u32)> {
        let deadline = Instant::now() + timeout;
        let mut healthy = self.compute.running_healthy_count(service_ref).await?;

        while healthy < desired {
            if Instant::now() >= deadline {
                warn!(
                    service_ref,
                    healthy, desired, "scale wait timed out with partial capacity"
                );
                return Ok((false, healthy));
            }
            debug!(service_ref, healthy, desired, "waiting for task health");
            tokio::time::sleep(self.poll_interval).await;
            healthy = self.compute.running_healthy_count(service_ref).await?;
        }

        info!(service_ref, healthy, "standby service at target capacity");
        Ok((true, healthy))
    }
}
