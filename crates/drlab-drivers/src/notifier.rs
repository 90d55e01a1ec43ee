use std::sync::Arc;

use tracing::info;

use drlab_core::{DrResult, FailoverReport, NotificationChannel};

/// Publishes the terminal report for an execution.
///
/// The orchestrator guarantees exactly-once invocation per execution; this
/// driver only formats and sends.
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
}

impl Notifier {
    /// Builds a notifier over a notification channel.
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Self {
        Self { channel }
    }

    /// Publishes the report: human summary first, full JSON appended for
    /// machine consumers.
    pub async fn publish_report(&self, topic_ref: &str, report: &FailoverReport) -> DrResult<()> {
        let subject = format!(
            "[drlab] failover {}: {}",
            report.status, report.execution_id
        );
        let body = format!(
            "{}\n\n---\n{}",
            report.summary(),
            serde_json::to_string_pretty(report)?
        );
        self.channel.publish(topic_ref, &subject, &body).await?;
        info!(topic_ref, status = %report.status, "terminal notification published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNotificationChannel;
    use drlab_core::{
        ExecutionStatus, FailoverExecution, FailoverMode, FailoverRequest, RecoveryTarget,
    };
    use drlab_core::target::DbMode;

    #[tokio::test]
    async fn publishes_subject_and_json_body() {
        let channel = Arc::new(MemoryNotificationChannel::new());
        let notifier = Notifier::new(channel.clone());

        let mut exec =
            FailoverExecution::new(&FailoverRequest::new(FailoverMode::Planned, "drill"));
        exec.start();
        exec.complete(ExecutionStatus::Succeeded);
        let target = RecoveryTarget {
            db_mode: DbMode::Replica,
            snapshot_fallback: false,
            db_instance_id: "dr-lab-primary-db".into(),
            replica_id: "dr-lab-secondary-replica".into(),
            snapshot_lookback_hours: 24,
            target_task_count: 2,
            primary_endpoint: "https://primary.example.com".into(),
            secondary_region_endpoint: "https://secondary.example.com".into(),
            credential_ref: "dr-lab/database-config".into(),
            service_ref: "dr-lab-secondary-service".into(),
            record_ref: "app.example.com".into(),
            topic_ref: "dr-lab-notifications".into(),
            rto_target_seconds: 10_800,
            rpo_target_seconds: 14_400,
        };
        let report = FailoverReport::from_execution(&exec, &target, Some(0));

        notifier
            .publish_report("dr-lab-notifications", &report)
            .await
            .unwrap();

        let published = channel.published();
        assert_eq!(published.len(), 1);
        let (topic, subject, body) = &published[0];
        assert_eq!(topic, "dr-lab-notifications");
        assert!(subject.contains("succeeded"));
        assert!(body.contains("rto_actual_seconds"));
    }
}
