use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DrResult;
use crate::execution::FailoverExecution;
use crate::ids::{ExecutionId, OperationId, SnapshotId};

/// Progress of a long-running infrastructure operation.
///
/// Recovery operations run for minutes; callers poll instead of blocking so
/// the orchestrator can compose its own timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum OperationStatus {
    /// Still running.
    InProgress,
    /// Finished; the recovered database answers at `endpoint`.
    Complete {
        /// Writable endpoint of the recovered instance.
        endpoint: String,
    },
    /// The operation failed on the infrastructure side.
    Failed {
        /// Failure detail reported by the control plane.
        reason: String,
    },
}

/// One automated snapshot as listed by the database control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot identifier.
    pub snapshot_id: SnapshotId,
    /// Creation timestamp in UTC.
    pub created_at: DateTime<Utc>,
}

/// Stored secret value with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretValue {
    /// Serialized secret payload.
    pub value: String,
    /// Version observed at read time; passed back on write.
    pub version: u64,
}

/// Result of a conditional secret write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// The write landed.
    Ok,
    /// The stored version no longer matched `expected_version`.
    Conflict,
}

/// Database control plane: replica promotion, snapshot restore, polling.
#[async_trait]
pub trait DatabaseControl: Send + Sync {
    /// Starts promoting the cross-region replica to a writable primary.
    async fn promote_replica(&self, replica_id: &str) -> DrResult<OperationId>;

    /// Starts restoring a snapshot to a new instance.
    async fn restore_from_snapshot(
        &self,
        instance_id: &str,
        snapshot_id: SnapshotId,
    ) -> DrResult<OperationId>;

    /// Polls a previously started operation.
    async fn poll_operation(&self, operation: OperationId) -> DrResult<OperationStatus>;

    /// Lists automated snapshots for an instance, ordered by creation time.
    async fn list_snapshots(&self, instance_id: &str) -> DrResult<Vec<SnapshotInfo>>;
}

/// Credential store with optimistic-concurrency writes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Reads the current secret value and version.
    async fn read_secret(&self, credential_ref: &str) -> DrResult<SecretValue>;

    /// Writes a new value if the stored version still matches.
    async fn write_secret(
        &self,
        credential_ref: &str,
        value: &str,
        expected_version: u64,
    ) -> DrResult<WriteResult>;
}

/// Compute control plane for the standby service.
#[async_trait]
pub trait ComputeControl: Send + Sync {
    /// Sets the desired task count; scaling proceeds asynchronously.
    async fn set_desired_count(&self, service_ref: &str, desired: u32) -> DrResult<()>;

    /// Returns the number of running-and-healthy tasks.
    async fn running_healthy_count(&self, service_ref: &str) -> DrResult<u32>;
}

/// DNS/record routing control.
#[async_trait]
pub trait RoutingControl: Send + Sync {
    /// Returns the target the record currently points at.
    async fn active_target(&self, record_ref: &str) -> DrResult<String>;

    /// Points the record at a new target. Propagation is asynchronous.
    async fn set_active_target(&self, record_ref: &str, target: &str) -> DrResult<()>;
}

/// Terminal-status notification channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Publishes a message to the topic.
    async fn publish(&self, topic_ref: &str, subject: &str, message: &str) -> DrResult<()>;
}

/// Timeout-bounded endpoint health check (`GET url -> status code`).
#[async_trait]
pub trait EndpointCheck: Send + Sync {
    /// Issues one GET and returns the HTTP status code.
    async fn get(&self, url: &str, timeout: Duration) -> DrResult<u16>;
}

/// Synthetic write probe used by post-checks against the recovered target.
#[async_trait]
pub trait WriteCheck: Send + Sync {
    /// Performs a synthetic write; an error means the target rejects writes.
    async fn write_test(&self, endpoint: &str) -> DrResult<()>;
}

/// Append-only persistence for terminal execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persists a terminal execution record, keyed by its execution id.
    async fn record(&self, execution: &FailoverExecution) -> DrResult<()>;

    /// Loads a previously recorded execution.
    async fn load(&self, execution_id: ExecutionId) -> DrResult<Option<FailoverExecution>>;

    /// Lists recorded execution ids.
    async fn list(&self) -> DrResult<Vec<ExecutionId>>;
}
