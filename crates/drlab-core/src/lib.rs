//! Core domain types and traits for the drlab failover orchestrator.

pub mod config;
pub mod error;
pub mod execution;
pub mod health;
pub mod ids;
pub mod report;
pub mod request;
pub mod target;
pub mod traits;

pub use config::{DrConfig, ProbeConfig, RetryConfig, RetryTuning, StepBudget, StoreConfig};
pub use error::{DrResult, FailoverError};
pub use execution::{
    ExecutionStatus, FailoverExecution, StepName, StepOutcome, StepResult, StepWarning,
};
pub use health::HealthVerdict;
pub use ids::{ExecutionId, OperationId, SnapshotId};
pub use report::FailoverReport;
pub use request::{FailoverMode, FailoverRequest};
pub use target::{DbMode, RecoveryTarget};
pub use traits::{
    ComputeControl, CredentialStore, DatabaseControl, EndpointCheck, ExecutionStore,
    NotificationChannel, OperationStatus, RoutingControl, SecretValue, SnapshotInfo, WriteCheck,
    WriteResult,
};
