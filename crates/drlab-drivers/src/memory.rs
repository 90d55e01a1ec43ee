//! In-memory collaborator implementations.
//!
//! Deterministic stand-ins for the cloud control planes the orchestrator
//! drives: scripted failure queues, poll-progression schedules, and call
//! histories for assertions. Used by the failover drill mode of the
//! service binary and by integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use drlab_core::{
    ComputeControl, CredentialStore, DatabaseControl, DrResult, EndpointCheck, FailoverError,
    NotificationChannel, OperationId, OperationStatus, RoutingControl, SecretValue, SnapshotId,
    SnapshotInfo, WriteCheck, WriteResult,
};

/// Scripted outcome consumed in order by an in-memory collaborator.
#[derive(Debug, Clone)]
pub enum MemoryFailure {
    /// Retryable error (transport-class).
    Retryable(&'static str),
    /// Fatal error.
    Fatal(&'static str),
    /// Success (no error).
    Ok,
}

impl MemoryFailure {
    fn to_error(&self) -> Option<FailoverError> {
        match self {
            MemoryFailure::Retryable(msg) => Some(FailoverError::transport(*msg)),
            MemoryFailure::Fatal(msg) => Some(FailoverError::internal(*msg)),
            MemoryFailure::Ok => None,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingOperation {
    polls_remaining: u32,
    outcome: OperationStatus,
}

/// In-memory database control plane.
///
/// Operations report `InProgress` for a configurable number of polls and
/// then complete with the configured endpoint (or the scripted failure).
pub struct MemoryDatabaseControl {
    replica_promotable: RwLock<bool>,
    snapshots: RwLock<Vec<SnapshotInfo>>,
    polls_until_complete: RwLock<u32>,
    /// Scripted terminal outcomes for upcoming operations; empty = complete.
    operation_failures: RwLock<VecDeque<&'static str>>,
    operations: RwLock<HashMap<OperationId, PendingOperation>>,
    restored: RwLock<Option<SnapshotId>>,
    promoted: RwLock<Option<String>>,
    endpoint: RwLock<String>,
}

impl MemoryDatabaseControl {
    /// A control plane with a promotable replica and no snapshots.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            replica_promotable: RwLock::new(true),
            snapshots: RwLock::new(Vec::new()),
            polls_until_complete: RwLock::new(0),
            operation_failures: RwLock::new(VecDeque::new()),
            operations: RwLock::new(HashMap::new()),
            restored: RwLock::new(None),
            promoted: RwLock::new(None),
            endpoint: RwLock::new("secondary-db.example.com:5433".to_string()),
        }
    }

    /// Marks the replica promotable or not.
    pub fn set_replica_promotable(&self, promotable: bool) {
        *self.replica_promotable.write() = promotable;
    }

    /// Replaces the snapshot catalog.
    pub fn set_snapshots(&self, snapshots: Vec<SnapshotInfo>) {
        *self.snapshots.write() = snapshots;
    }

    /// How many polls each operation reports `InProgress` before finishing.
    pub fn set_polls_until_complete(&self, polls: u32) {
        *self.polls_until_complete.write() = polls;
    }

    /// Endpoint reported by completed operations.
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        *self.endpoint.write() = endpoint.into();
    }

    /// Scripts the next N started operations to end `Failed` with `reason`.
    pub fn fail_next_operations(&self, n: usize, reason: &'static str) {
        let mut failures = self.operation_failures.write();
        for _ in 0..n {
            failures.push_back(reason);
        }
    }

    /// Snapshot the last restore targeted, if any.
    #[must_use]
    pub fn restored_snapshot(&self) -> Option<SnapshotId> {
        *self.restored.read()
    }

    /// Replica the last promotion targeted, if any.
    #[must_use]
    pub fn promoted_replica(&self) -> Option<String> {
        self.promoted.read().clone()
    }

    fn begin_operation(&self) -> OperationId {
        let outcome = match self.operation_failures.write().pop_front() {
            Some(reason) => OperationStatus::Failed {
                reason: reason.to_string(),
            },
            None => OperationStatus::Complete {
                endpoint: self.endpoint.read().clone(),
            },
        };
        let operation = OperationId::new();
        self.operations.write().insert(
            operation,
            PendingOperation {
                polls_remaining: *self.polls_until_complete.read(),
                outcome,
            },
        );
        operation
    }
}

#[async_trait]
impl DatabaseControl for MemoryDatabaseControl {
    async fn promote_replica(&self, replica_id: &str) -> DrResult<OperationId> {
        if !*self.replica_promotable.read() {
            return Err(FailoverError::replica_unavailable(
                replica_id,
                "replica is not in a promotable state",
            ));
        }
        *self.promoted.write() = Some(replica_id.to_string());
        Ok(self.begin_operation())
    }

    async fn restore_from_snapshot(
        &self,
        _instance_id: &str,
        snapshot_id: SnapshotId,
    ) -> DrResult<OperationId> {
        *self.restored.write() = Some(snapshot_id);
        Ok(self.begin_operation())
    }

    async fn poll_operation(&self, operation: OperationId) -> DrResult<OperationStatus> {
        let mut operations = self.operations.write();
        let pending = operations
            .get_mut(&operation)
            .ok_or_else(|| FailoverError::not_found("operation", operation.to_string()))?;
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            return Ok(OperationStatus::InProgress);
        }
        Ok(pending.outcome.clone())
    }

    async fn list_snapshots(&self, _instance_id: &str) -> DrResult<Vec<SnapshotInfo>> {
        let mut snapshots = self.snapshots.read().clone();
        snapshots.sort_by_key(|s| s.created_at);
        Ok(snapshots)
    }
}

/// In-memory versioned credential store with conflict/outage injection.
pub struct MemoryCredentialStore {
    secrets: RwLock<HashMap<String, SecretValue>>,
    conflicts: RwLock<u32>,
    outages: RwLock<u32>,
}

impl MemoryCredentialStore {
    /// An empty store.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            secrets: RwLock::new(HashMap::new()),
            conflicts: RwLock::new(0),
            outages: RwLock::new(0),
        }
    }

    /// Seeds a secret at version 1.
    pub fn seed(&self, credential_ref: &str, value: &str) {
        self.secrets.write().insert(
            credential_ref.to_string(),
            SecretValue {
                value: value.to_string(),
                version: 1,
            },
        );
    }

    /// The next write observes a version conflict.
    pub fn inject_conflict_once(&self) {
        *self.conflicts.write() += 1;
    }

    /// The next N reads/writes fail with `SecretStoreUnavailable`.
    pub fn inject_outages(&self, n: u32) {
        *self.outages.write() += n;
    }

    /// Current stored value, if present.
    #[must_use]
    pub fn current(&self, credential_ref: &str) -> Option<String> {
        self.secrets
            .read()
            .get(credential_ref)
            .map(|s| s.value.clone())
    }

    /// Current stored version, if present.
    #[must_use]
    pub fn version(&self, credential_ref: &str) -> Option<u64> {
        self.secrets.read().get(credential_ref).map(|s| s.version)
    }

    fn check_outage(&self) -> DrResult<()> {
        let mut outages = self.outages.write();
        if *outages > 0 {
            *outages -= 1;
            return Err(FailoverError::secret_store_unavailable(
                "injected store outage",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read_secret(&self, credential_ref: &str) -> DrResult<SecretValue> {
        self.check_outage()?;
        self.secrets
            .read()
            .get(credential_ref)
            .cloned()
            .ok_or_else(|| FailoverError::not_found("secret", credential_ref))
    }

    async fn write_secret(
        &self,
        credential_ref: &str,
        value: &str,
        expected_version: u64,
    ) -> DrResult<WriteResult> {
        self.check_outage()?;
        {
            let mut conflicts = self.conflicts.write();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Ok(WriteResult::Conflict);
            }
        }
        let mut secrets = self.secrets.write();
        let stored = secrets
            .get_mut(credential_ref)
            .ok_or_else(|| FailoverError::not_found("secret", credential_ref))?;
        if stored.version != expected_version {
            return Ok(WriteResult::Conflict);
        }
        stored.value = value.to_string();
        stored.version += 1;
        Ok(WriteResult::Ok)
    }
}

/// In-memory compute control with a scripted healthy-count ramp.
pub struct MemoryComputeControl {
    desired: RwLock<HashMap<String, u32>>,
    /// Healthy counts returned on successive polls; the last entry repeats.
    ramp: RwLock<Vec<u32>>,
    ramp_index: RwLock<usize>,
}

impl MemoryComputeControl {
    /// A control plane reporting zero healthy tasks until scripted.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            desired: RwLock::new(HashMap::new()),
            ramp: RwLock::new(vec![0]),
            ramp_index: RwLock::new(0),
        }
    }

    /// Scripts the healthy-count sequence (last value repeats forever).
    pub fn set_health_ramp(&self, ramp: Vec<u32>) {
        assert!(!ramp.is_empty(), "ramp must have at least one entry");
        *self.ramp.write() = ramp;
        *self.ramp_index.write() = 0;
    }

    /// Desired count last requested for a service, if any.
    #[must_use]
    pub fn desired(&self, service_ref: &str) -> Option<u32> {
        self.desired.read().get(service_ref).copied()
    }
}

#[async_trait]
impl ComputeControl for MemoryComputeControl {
    async fn set_desired_count(&self, service_ref: &str, desired: u32) -> DrResult<()> {
        self.desired
            .write()
            .insert(service_ref.to_string(), desired);
        Ok(())
    }

    async fn running_healthy_count(&self, _service_ref: &str) -> DrResult<u32> {
        let ramp = self.ramp.read();
        let mut index = self.ramp_index.write();
        let count = ramp[(*index).min(ramp.len() - 1)];
        *index += 1;
        Ok(count)
    }
}

/// In-memory routing control recording every accepted change.
pub struct MemoryRoutingControl {
    active: RwLock<HashMap<String, String>>,
    changes: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryRoutingControl {
    /// A routing table with one record pointing at `initial_target`.
    #[must_use]
    pub fn new(record_ref: &str, initial_target: &str) -> Self {
        let mut active = HashMap::new();
        active.insert(record_ref.to_string(), initial_target.to_string());
        Self {
            active: RwLock::new(active),
            changes: RwLock::new(HashMap::new()),
        }
    }

    /// Target a record currently points at.
    #[must_use]
    pub fn active(&self, record_ref: &str) -> Option<String> {
        self.active.read().get(record_ref).cloned()
    }

    /// Number of accepted changes for a record.
    #[must_use]
    pub fn change_count(&self, record_ref: &str) -> usize {
        self.changes
            .read()
            .get(record_ref)
            .map_or(0, |changes| changes.len())
    }
}

#[async_trait]
impl RoutingControl for MemoryRoutingControl {
    async fn active_target(&self, record_ref: &str) -> DrResult<String> {
        self.active
            .read()
            .get(record_ref)
            .cloned()
            .ok_or_else(|| FailoverError::not_found("record", record_ref))
    }

    async fn set_active_target(&self, record_ref: &str, target: &str) -> DrResult<()> {
        self.active
            .write()
            .insert(record_ref.to_string(), target.to_string());
        self.changes
            .write()
            .entry(record_ref.to_string())
            .or_default()
            .push(target.to_string());
        Ok(())
    }
}

/// In-memory notification channel capturing published messages.
pub struct MemoryNotificationChannel {
    published: RwLock<Vec<(String, String, String)>>,
    failures: RwLock<VecDeque<MemoryFailure>>,
}

impl MemoryNotificationChannel {
    /// A channel that accepts every publish.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            published: RwLock::new(Vec::new()),
            failures: RwLock::new(VecDeque::new()),
        }
    }

    /// Scripts outcomes for upcoming publishes (consumed in order).
    pub fn set_failures(&self, pattern: Vec<MemoryFailure>) {
        *self.failures.write() = pattern.into();
    }

    /// Every `(topic, subject, message)` accepted so far.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String, String)> {
        self.published.read().clone()
    }
}

#[async_trait]
impl NotificationChannel for MemoryNotificationChannel {
    async fn publish(&self, topic_ref: &str, subject: &str, message: &str) -> DrResult<()> {
        if let Some(error) = self.failures.write().pop_front().and_then(|f| f.to_error()) {
            return Err(error);
        }
        self.published.write().push((
            topic_ref.to_string(),
            subject.to_string(),
            message.to_string(),
        ));
        Ok(())
    }
}

/// In-memory endpoint check returning scripted status codes.
pub struct MemoryEndpointCheck {
    /// Status codes returned on successive probes; the last entry repeats.
    statuses: RwLock<Vec<u16>>,
    index: RwLock<usize>,
    reachable: bool,
    /// Probe timestamps, for cadence assertions.
    probes: RwLock<Vec<DateTime<Utc>>>,
}

impl MemoryEndpointCheck {
    /// A check returning the scripted statuses (last value repeats).
    #[must_use]
    pub fn with_statuses(statuses: Vec<u16>) -> Self {
        assert!(!statuses.is_empty(), "statuses must have at least one entry");
        Self {
            statuses: RwLock::new(statuses),
            index: RwLock::new(0),
            reachable: true,
            probes: RwLock::new(Vec::new()),
        }
    }

    /// A check that always answers 200.
    #[must_use]
    pub fn healthy() -> Self {
        Self::with_statuses(vec![200])
    }

    /// A check that always answers 503.
    #[must_use]
    pub fn down() -> Self {
        Self::with_statuses(vec![503])
    }

    /// A check whose transport always fails.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            statuses: RwLock::new(vec![0]),
            index: RwLock::new(0),
            reachable: false,
            probes: RwLock::new(Vec::new()),
        }
    }

    /// Number of probes observed.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.probes.read().len()
    }
}

#[async_trait]
impl EndpointCheck for MemoryEndpointCheck {
    async fn get(&self, url: &str, _timeout: Duration) -> DrResult<u16> {
        self.probes.write().push(Utc::now());
        if !self.reachable {
            return Err(FailoverError::transport(format!(
                "connection refused: {url}"
            )));
        }
        let statuses = self.statuses.read();
        let mut index = self.index.write();
        let status = statuses[(*index).min(statuses.len() - 1)];
        *index += 1;
        Ok(status)
    }
}

/// In-memory synthetic write check.
pub struct MemoryWriteCheck {
    /// Outcomes returned on successive write tests; the last entry repeats.
    outcomes: RwLock<Vec<bool>>,
    index: RwLock<usize>,
    tested: RwLock<Vec<String>>,
}

impl MemoryWriteCheck {
    /// A check with scripted pass/fail outcomes (last value repeats).
    #[must_use]
    pub fn with_outcomes(outcomes: Vec<bool>) -> Self {
        assert!(!outcomes.is_empty(), "outcomes must have at least one entry");
        Self {
            outcomes: RwLock::new(outcomes),
            index: RwLock::new(0),
            tested: RwLock::new(Vec::new()),
        }
    }

    /// A check that always passes.
    #[must_use]
    pub fn passing() -> Self {
        Self::with_outcomes(vec![true])
    }

    /// A check that always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_outcomes(vec![false])
    }

    /// Endpoints write-tested so far.
    #[must_use]
    pub fn tested(&self) -> Vec<String> {
        self.tested.read().clone()
    }
}

#[async_trait]
impl WriteCheck for MemoryWriteCheck {
    async fn write_test(&self, endpoint: &str) -> DrResult<()> {
        self.tested.write().push(endpoint.to_string());
        let outcomes = self.outcomes.read();
        let mut index = self.index.write();
        let pass = outcomes[(*index).min(outcomes.len() - 1)];
        *index += 1;
        if pass {
            Ok(())
        } else {
            Err(FailoverError::internal(format!(
                "synthetic write against {endpoint} was rejected"
            )))
        }
    }
}

/// Convenience bundle wiring every in-memory collaborator together.
///
/// This is the "site" a failover drill runs against: a promotable replica,
/// a seeded connection secret, a routing record on the primary target, and
/// a healthy secondary endpoint.
pub struct MemorySite {
    pub database: Arc<MemoryDatabaseControl>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub compute: Arc<MemoryComputeControl>,
    pub routing: Arc<MemoryRoutingControl>,
    pub notifications: Arc<MemoryNotificationChannel>,
    pub primary_check: Arc<MemoryEndpointCheck>,
    pub secondary_check: Arc<MemoryEndpointCheck>,
    pub write_check: Arc<MemoryWriteCheck>,
}

impl MemorySite {
    /// A healthy site ready for a planned drill.
    #[must_use]
    pub fn healthy(record_ref: &str, primary_target: &str, credential_ref: &str) -> Self {
        let credentials = Arc::new(MemoryCredentialStore::new());
        credentials.seed(
            credential_ref,
            r#"{"engine":"postgres","host":"primary-db.example.com","port":5433,"dbname":"drlab","username":"app","password":"s3cret"}"#,
        );
        Self {
            database: Arc::new(MemoryDatabaseControl::new()),
            credentials,
            compute: Arc::new(MemoryComputeControl::new()),
            routing: Arc::new(MemoryRoutingControl::new(record_ref, primary_target)),
            notifications: Arc::new(MemoryNotificationChannel::new()),
            primary_check: Arc::new(MemoryEndpointCheck::healthy()),
            secondary_check: Arc::new(MemoryEndpointCheck::healthy()),
            write_check: Arc::new(MemoryWriteCheck::passing()),
        }
    }

    /// The same site with an unreachable primary, for unplanned drills.
    #[must_use]
    pub fn with_primary_down(record_ref: &str, primary_target: &str, credential_ref: &str) -> Self {
        let site = Self::healthy(record_ref, primary_target, credential_ref);
        Self {
            primary_check: Arc::new(MemoryEndpointCheck::down()),
            ..site
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn credential_store_detects_stale_version() {
        let store = MemoryCredentialStore::new();
        store.seed("dr-lab/database-config", "v1");

        let read = store.read_secret("dr-lab/database-config").await.unwrap();
        assert_eq!(read.version, 1);

        // A write with the observed version lands and bumps the version.
        assert_eq!(
            store
                .write_secret("dr-lab/database-config", "v2", read.version)
                .await
                .unwrap(),
            WriteResult::Ok
        );

        // Re-using the stale version conflicts.
        assert_eq!(
            store
                .write_secret("dr-lab/database-config", "v3", read.version)
                .await
                .unwrap(),
            WriteResult::Conflict
        );
        assert_eq!(store.current("dr-lab/database-config").unwrap(), "v2");
    }

    #[tokio::test]
    async fn database_control_scripts_operation_failures() {
        let db = MemoryDatabaseControl::new();
        db.fail_next_operations(1, "restore ran out of storage");

        let op = db.promote_replica("dr-lab-secondary-replica").await.unwrap();
        match db.poll_operation(op).await.unwrap() {
            OperationStatus::Failed { reason } => {
                assert!(reason.contains("storage"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        // Next operation succeeds.
        let op = db.promote_replica("dr-lab-secondary-replica").await.unwrap();
        assert!(matches!(
            db.poll_operation(op).await.unwrap(),
            OperationStatus::Complete { .. }
        ));
    }

    #[tokio::test]
    async fn endpoint_check_repeats_last_status() {
        let check = MemoryEndpointCheck::with_statuses(vec![200, 503]);
        let timeout = Duration::from_millis(100);
        assert_eq!(check.get("https://x", timeout).await.unwrap(), 200);
        assert_eq!(check.get("https://x", timeout).await.unwrap(), 503);
        assert_eq!(check.get("https://x", timeout).await.unwrap(), 503);
        assert_eq!(check.probe_count(), 3);
    }
}
