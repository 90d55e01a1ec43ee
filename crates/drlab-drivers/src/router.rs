use std::sync::Arc;

use tracing::info;

use drlab_core::{DrResult, RoutingControl};

/// Flips the DNS/record target from primary to secondary.
///
/// Idempotent: switching to the already-active target is a no-op success.
/// The router reports "change accepted" only; record propagation is
/// asynchronous and confirmed by the post-check step, not here.
pub struct TrafficRouter {
    routing: Arc<dyn RoutingControl>,
}

impl TrafficRouter {
    /// Builds a router over a routing control plane.
    pub fn new(routing: Arc<dyn RoutingControl>) -> Self {
        Self { routing }
    }

    /// Points the record at `target`, skipping the write when it already
    /// does. Returns whether a change was submitted.
    pub async fn switch_to(&self, record_ref: &str, target: &str) -> DrResult<bool> {
        let active = self.routing.active_target(record_ref).await?;
        if active == target {
            info!(record_ref, target, "record already points at target");
            return Ok(false);
        }

        self.routing.set_active_target(record_ref, target).await?;
        info!(record_ref, from = active.as_str(), to = target, "traffic switched");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRoutingControl;

    #[tokio::test]
    async fn switching_twice_produces_one_observable_change() {
        let routing = Arc::new(MemoryRoutingControl::new(
            "app.example.com",
            "primary-alb.example.com",
        ));
        let router = TrafficRouter::new(routing.clone());

        let changed = router
            .switch_to("app.example.com", "secondary-alb.example.com")
            .await
            .unwrap();
        assert!(changed);

        let changed_again = router
            .switch_to("app.example.com", "secondary-alb.example.com")
            .await
            .unwrap();
        assert!(!changed_again);

        assert_eq!(routing.change_count("app.example.com"), 1);
        assert_eq!(
            routing.active("app.example.com"),
            Some("secondary-alb.example.com".to_string())
        );
    }
}
