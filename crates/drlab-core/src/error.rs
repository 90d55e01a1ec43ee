use thiserror::Error;

use crate::execution::StepName;

/// Canonical error type for failover orchestration.
#[derive(Debug, Error)]
pub enum FailoverError {
    /// The cross-region replica is not in a promotable state.
    #[error("replica `{replica_id}` is not promotable: {reason}")]
    ReplicaUnavailable {
        /// Identifier of the replica that could not be promoted.
        replica_id: String,
        /// Why promotion was refused (catching up, deleted, ...).
        reason: String,
    },

    /// No automated snapshot exists inside the configured lookback window.
    #[error("no snapshot for `{instance_id}` within the last {lookback_hours}h")]
    NoSnapshotFound {
        /// Database instance the snapshot search ran against.
        instance_id: String,
        /// Lookback window that was searched.
        lookback_hours: u32,
    },

    /// The stored secret changed between read and write.
    #[error("secret `{credential_ref}` changed since last read")]
    SecretWriteConflict {
        /// Reference of the contested secret.
        credential_ref: String,
    },

    /// The credential store could not be reached.
    #[error("credential store unavailable: {reason}")]
    SecretStoreUnavailable {
        /// Transport-level failure detail.
        reason: String,
    },

    /// An unplanned failover was requested while the primary still answers.
    #[error("primary still healthy after {consecutive_failures} consecutive failure(s)")]
    PrimaryStillHealthy {
        /// Failure count observed when the execution aborted.
        consecutive_failures: u32,
    },

    /// Another failover execution holds the single run slot.
    #[error("execution `{execution_id}` is already running")]
    ExecutionInProgress {
        /// Identifier of the execution occupying the slot.
        execution_id: String,
    },

    /// Cancellation arrived after the point of no return.
    #[error("cancellation refused at step `{step}`: recovery is not reversible")]
    CancellationRefused {
        /// Step the execution had reached when cancellation was observed.
        step: StepName,
    },

    /// The recovery target configuration is unusable.
    #[error("invalid recovery target: {message}")]
    InvalidTarget {
        /// Human-readable validation failure.
        message: String,
    },

    /// A started recovery operation reported failure from the control plane.
    ///
    /// The whole recovery step is restarted, up to the configured cap.
    #[error("recovery operation failed: {reason}")]
    OperationFailed {
        /// Failure detail reported by the control plane.
        reason: String,
    },

    /// A step exhausted its allocated share of the RTO budget.
    #[error("step `{step}` exceeded its {budget_secs}s budget")]
    StepTimeout {
        /// Step that timed out.
        step: StepName,
        /// Budget that was exceeded, in seconds.
        budget_secs: u64,
    },

    /// Transient transport failure talking to a collaborator.
    #[error("transport error: {message}")]
    Transport {
        /// Transport-level failure detail.
        message: String,
    },

    /// Entity was not found by a collaborator.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"secret"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl FailoverError {
    /// Creates a `ReplicaUnavailable` variant.
    #[must_use]
    pub fn replica_unavailable(replica_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReplicaUnavailable {
            replica_id: replica_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `SecretStoreUnavailable` variant.
    #[must_use]
    pub fn secret_store_unavailable(reason: impl Into<String>) -> Self {
        Self::SecretStoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a `Transport` variant.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an `InvalidTarget` variant.
    #[must_use]
    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the owning component may retry the failed operation.
    ///
    /// Retryable errors are retried with bounded attempts and backoff;
    /// everything else halts the current step as fatal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SecretWriteConflict { .. }
                | Self::SecretStoreUnavailable { .. }
                | Self::Transport { .. }
                | Self::StepTimeout { .. }
                | Self::OperationFailed { .. }
        )
    }
}

/// Convenient result alias for failover operations.
pub type DrResult<T> = Result<T, FailoverError>;
