use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use drlab_core::{
    DatabaseControl, DbMode, DrResult, FailoverError, OperationId, OperationStatus,
    RecoveryTarget, SnapshotInfo,
};

/// Recovery path, selected by configuration rather than runtime inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Promote the existing cross-region replica.
    Replica {
        /// Replica to promote.
        replica_id: String,
    },
    /// Restore the latest automated snapshot within the lookback window.
    Snapshot {
        /// Instance whose snapshots are searched.
        instance_id: String,
        /// Lookback window in hours.
        lookback_hours: u32,
    },
}

impl RecoveryStrategy {
    /// Builds the strategy the target's `db_mode` selects.
    #[must_use]
    pub fn for_target(target: &RecoveryTarget) -> Self {
        match target.db_mode {
            DbMode::Replica => Self::Replica {
                replica_id: target.replica_id.clone(),
            },
            DbMode::Snapshot => Self::Snapshot {
                instance_id: target.db_instance_id.clone(),
                lookback_hours: target.snapshot_lookback_hours,
            },
        }
    }

    /// The snapshot-restore strategy for the same target, used when a
    /// failed promotion falls back.
    #[must_use]
    pub fn snapshot_fallback(target: &RecoveryTarget) -> Self {
        Self::Snapshot {
            instance_id: target.db_instance_id.clone(),
            lookback_hours: target.snapshot_lookback_hours,
        }
    }

    /// Which `DbMode` this strategy implements.
    #[must_use]
    pub fn mode(&self) -> DbMode {
        match self {
            Self::Replica { .. } => DbMode::Replica,
            Self::Snapshot { .. } => DbMode::Snapshot,
        }
    }
}

/// A started recovery operation awaiting poll-based completion.
#[derive(Debug, Clone)]
pub struct PendingRecovery {
    /// Control-plane operation handle.
    pub operation: OperationId,
    /// Mode the operation runs under.
    pub mode: DbMode,
    /// Age of the restored snapshot at selection time; `None` on the
    /// replica path. Bounds the achievable RPO.
    pub snapshot_age_secs: Option<i64>,
}

/// Result of a completed recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// Writable endpoint of the recovered database.
    pub new_endpoint: String,
    /// When recovery completed, in UTC.
    pub recovered_at: DateTime<Utc>,
    /// Snapshot age at selection time; `None` for replica promotion.
    pub snapshot_age_secs: Option<i64>,
}

/// Drives replica promotion or snapshot restore through the database
/// control plane, exposing a start/poll contract so the orchestrator can
/// compose its own timeout.
pub struct RecoveryDriver {
    db: Arc<dyn DatabaseControl>,
}

impl RecoveryDriver {
    /// Builds a driver over a database control plane.
    pub fn new(db: Arc<dyn DatabaseControl>) -> Self {
        Self { db }
    }

    /// Starts the recovery operation for a strategy.
    ///
    /// Replica path errors surface as `ReplicaUnavailable`; an empty
    /// snapshot window surfaces as `NoSnapshotFound`.
    pub async fn start(&self, strategy: &RecoveryStrategy) -> DrResult<PendingRecovery> {
        match strategy {
            RecoveryStrategy::Replica { replica_id } => {
                info!(replica_id = replica_id.as_str(), "promoting replica");
                let operation = self.db.promote_replica(replica_id).await?;
                Ok(PendingRecovery {
                    operation,
                    mode: DbMode::Replica,
                    snapshot_age_secs: None,
                })
            }
            RecoveryStrategy::Snapshot {
                instance_id,
                lookback_hours,
            } => {
                let snapshot =
                    self.latest_snapshot(instance_id, *lookback_hours).await?;
                let age_secs = (Utc::now() - snapshot.created_at).num_seconds().max(0);
                info!(
                    instance_id = instance_id.as_str(),
                    snapshot_id = %snapshot.snapshot_id,
                    age_secs,
                    "restoring latest snapshot"
                );
                let operation = self
                    .db
                    .restore_from_snapshot(instance_id, snapshot.snapshot_id)
                    .await?;
                Ok(PendingRecovery {
                    operation,
                    mode: DbMode::Snapshot,
                    snapshot_age_secs: Some(age_secs),
                })
            }
        }
    }

    /// Polls a started recovery operation.
    pub async fn poll(&self, pending: &PendingRecovery) -> DrResult<OperationStatus> {
        self.db.poll_operation(pending.operation).await
    }

    /// Builds the outcome for a completed operation.
    #[must_use]
    pub fn outcome(pending: &PendingRecovery, endpoint: String) -> RecoveryOutcome {
        RecoveryOutcome {
            new_endpoint: endpoint,
            recovered_at: Utc::now(),
            snapshot_age_secs: pending.snapshot_age_secs,
        }
    }

    /// Picks the most recent snapshot inside the lookback window.
    ///
    /// Ties on creation time break toward the later list entry, matching
    /// the control plane's creation-time ordering.
    async fn latest_snapshot(
        &self,
        instance_id: &str,
        lookback_hours: u32,
    ) -> DrResult<SnapshotInfo> {
        let cutoff = Utc::now() - ChronoDuration::hours(i64::from(lookback_hours));
        let snapshots = self.db.list_snapshots(instance_id).await?;
        snapshots
            .into_iter()
            .filter(|s| s.created_at >= cutoff)
            .max_by_key(|s| s.created_at)
            .ok_or(FailoverError::NoSnapshotFound {
                instance_id: instance_id.to_string(),
                lookback_hours,
            })
    }
}
