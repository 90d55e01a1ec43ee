use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::info;

use drlab_core::{
    DbMode, DrConfig, FailoverMode, FailoverReport, FailoverRequest, RecoveryTarget, SnapshotId,
    SnapshotInfo,
};
use drlab_drivers::MemorySite;
use drlab_orchestrator::{FailoverOrchestrator, JsonFileExecutionStore, OrchestratorHandles};

const RECORD_REF: &str = "app.example.com";
const PRIMARY_TARGET: &str = "primary-alb.example.com";
const SECONDARY_TARGET: &str = "secondary-alb.example.com";
const CREDENTIAL_REF: &str = "dr-lab/database-config";

/// Runs one failover execution against a deterministic in-memory site.
///
/// Planned drills run against a healthy primary; unplanned drills simulate
/// an unreachable primary so the health-confirmation gate is exercised.
pub async fn run_drill(
    mode: FailoverMode,
    reason: &str,
    db_mode: DbMode,
    fallback: bool,
    task_count: u32,
    data_dir: &str,
) -> Result<FailoverReport, Box<dyn std::error::Error>> {
    let site = match mode {
        FailoverMode::Planned => MemorySite::healthy(RECORD_REF, PRIMARY_TARGET, CREDENTIAL_REF),
        FailoverMode::Unplanned => {
            MemorySite::with_primary_down(RECORD_REF, PRIMARY_TARGET, CREDENTIAL_REF)
        }
    };

    // Recovery takes a few polls; the snapshot catalog holds a recent
    // automated snapshot so the snapshot path (and fallback) can run.
    site.database.set_polls_until_complete(2);
    site.database
        .set_endpoint("secondary-db.dr-lab.example.com:5433");
    site.database.set_snapshots(vec![
        SnapshotInfo {
            snapshot_id: SnapshotId::new(),
            created_at: Utc::now() - ChronoDuration::hours(6),
        },
        SnapshotInfo {
            snapshot_id: SnapshotId::new(),
            created_at: Utc::now() - ChronoDuration::minutes(30),
        },
    ]);

    // Tasks come up one per poll until the target count is reached.
    site.compute
        .set_health_ramp((0..=task_count).collect::<Vec<_>>());

    let target = RecoveryTarget {
        db_mode,
        snapshot_fallback: fallback,
        db_instance_id: "dr-lab-primary-db".to_string(),
        replica_id: "dr-lab-secondary-replica".to_string(),
        snapshot_lookback_hours: RecoveryTarget::DEFAULT_SNAPSHOT_LOOKBACK_HOURS,
        target_task_count: task_count,
        primary_endpoint: "https://primary.dr-lab.example.com/healthz".to_string(),
        secondary_region_endpoint: SECONDARY_TARGET.to_string(),
        credential_ref: CREDENTIAL_REF.to_string(),
        service_ref: "dr-lab-secondary-service".to_string(),
        record_ref: RECORD_REF.to_string(),
        topic_ref: "dr-lab-notifications".to_string(),
        rto_target_seconds: RecoveryTarget::DEFAULT_RTO_SECONDS,
        rpo_target_seconds: RecoveryTarget::DEFAULT_RPO_SECONDS,
    };

    let mut config = DrConfig::load()?;
    // The simulated site answers instantly; poll fast so the drill does not
    // idle between state checks.
    config.probe.poll_interval_ms = 50;
    config.store.data_dir = data_dir.to_string();

    let handles = OrchestratorHandles {
        database: site.database.clone(),
        credentials: site.credentials.clone(),
        compute: site.compute.clone(),
        routing: site.routing.clone(),
        notifications: site.notifications.clone(),
        primary_check: site.primary_check.clone(),
        secondary_check: site.secondary_check.clone(),
        write_check: site.write_check.clone(),
        store: Arc::new(JsonFileExecutionStore::new(&config.store.data_dir)),
    };

    let orchestrator = FailoverOrchestrator::new(handles, config, target);
    let request = FailoverRequest::new(mode, reason);
    let report = orchestrator.run(request).await?;

    for (topic, subject, _) in site.notifications.published() {
        info!(topic = topic.as_str(), subject = subject.as_str(), "notification published");
    }

    Ok(report)
}
