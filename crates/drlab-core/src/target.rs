use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DrResult, FailoverError};

/// Which database recovery path the execution should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbMode {
    /// Promote the existing cross-region read replica.
    Replica,
    /// Restore the latest automated snapshot to a new instance.
    Snapshot,
}

impl DbMode {
    /// Returns the canonical lowercase string used in config and records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Replica => "replica",
            Self::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for DbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replica" => Ok(Self::Replica),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(format!(
                "invalid db mode '{other}', must be 'replica' or 'snapshot'"
            )),
        }
    }
}

/// Configuration snapshot taken at execution start.
///
/// Read-only for the execution's lifetime; no step mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryTarget {
    /// Recovery path to attempt first.
    pub db_mode: DbMode,
    /// Whether a failed replica promotion may fall back to snapshot restore.
    pub snapshot_fallback: bool,
    /// Primary database instance identifier (snapshot source).
    pub db_instance_id: String,
    /// Cross-region replica identifier.
    pub replica_id: String,
    /// How far back to search for automated snapshots.
    pub snapshot_lookback_hours: u32,
    /// Desired standby task count after scale-up.
    pub target_task_count: u32,
    /// Application endpoint served from the primary region (health-checked).
    pub primary_endpoint: String,
    /// Application endpoint served from the secondary region.
    pub secondary_region_endpoint: String,
    /// Reference of the connection secret to rewrite after recovery.
    pub credential_ref: String,
    /// Reference of the standby compute service.
    pub service_ref: String,
    /// Reference of the DNS record to flip.
    pub record_ref: String,
    /// Reference of the notification topic.
    pub topic_ref: String,
    /// Recovery time objective, in seconds.
    pub rto_target_seconds: u64,
    /// Recovery point objective, in seconds.
    pub rpo_target_seconds: u64,
}

impl RecoveryTarget {
    /// Operational defaults: 3 h RTO, 4 h RPO, 24 h snapshot lookback.
    pub const DEFAULT_RTO_SECONDS: u64 = 3 * 60 * 60;
    pub const DEFAULT_RPO_SECONDS: u64 = 4 * 60 * 60;
    pub const DEFAULT_SNAPSHOT_LOOKBACK_HOURS: u32 = 24;

    /// Validates that every reference the steps will touch is present.
    pub fn validate(&self) -> DrResult<()> {
        if self.db_instance_id.is_empty() {
            return Err(FailoverError::invalid_target("db_instance_id is empty"));
        }
        if self.db_mode == DbMode::Replica && self.replica_id.is_empty() {
            return Err(FailoverError::invalid_target(
                "replica_id is required when db_mode is replica",
            ));
        }
        if self.target_task_count == 0 {
            return Err(FailoverError::invalid_target(
                "target_task_count must be > 0",
            ));
        }
        if self.primary_endpoint.is_empty() {
            return Err(FailoverError::invalid_target("primary_endpoint is empty"));
        }
        if self.secondary_region_endpoint.is_empty() {
            return Err(FailoverError::invalid_target(
                "secondary_region_endpoint is empty",
            ));
        }
        for (name, value) in [
            ("credential_ref", &self.credential_ref),
            ("service_ref", &self.service_ref),
            ("record_ref", &self.record_ref),
            ("topic_ref", &self.topic_ref),
        ] {
            if value.is_empty() {
                return Err(FailoverError::invalid_target(format!("{name} is empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_target() -> RecoveryTarget {
        RecoveryTarget {
            db_mode: DbMode::Replica,
            snapshot_fallback: true,
            db_instance_id: "dr-lab-primary-db".into(),
            replica_id: "dr-lab-secondary-replica".into(),
            snapshot_lookback_hours: RecoveryTarget::DEFAULT_SNAPSHOT_LOOKBACK_HOURS,
            target_task_count: 2,
            primary_endpoint: "https://primary.dr-lab.example.com".into(),
            secondary_region_endpoint: "https://secondary.dr-lab.example.com".into(),
            credential_ref: "dr-lab/database-config".into(),
            service_ref: "dr-lab-secondary-service".into(),
            record_ref: "app.example.com".into(),
            topic_ref: "dr-lab-notifications".into(),
            rto_target_seconds: RecoveryTarget::DEFAULT_RTO_SECONDS,
            rpo_target_seconds: RecoveryTarget::DEFAULT_RPO_SECONDS,
        }
    }

    #[test]
    fn valid_target_passes() {
        assert!(sample_target().validate().is_ok());
    }

    #[test]
    fn replica_mode_requires_replica_id() {
        let mut target = sample_target();
        target.replica_id = String::new();
        assert!(target.validate().is_err());

        // Snapshot mode does not need a replica.
        target.db_mode = DbMode::Snapshot;
        assert!(target.validate().is_ok());
    }

    #[test]
    fn zero_task_count_is_rejected() {
        let mut target = sample_target();
        target.target_task_count = 0;
        assert!(target.validate().is_err());
    }

    #[test]
    fn db_mode_round_trips() {
        assert_eq!(DbMode::from_str("replica").unwrap(), DbMode::Replica);
        assert_eq!(DbMode::from_str("snapshot").unwrap(), DbMode::Snapshot);
        assert!(DbMode::from_str("logical").is_err());
    }
}
