//! Step drivers for the drlab failover orchestrator.
//!
//! Each driver wraps one collaborator interface from `drlab-core` and owns
//! the step-local semantics (snapshot selection, optimistic secret writes,
//! scale polling, idempotent routing). Retry policy is applied by the
//! orchestrator, not inside the drivers.

pub mod memory;
pub mod notifier;
pub mod prober;
pub mod recovery;
pub mod retry;
pub mod router;
pub mod scaler;
pub mod secrets;

pub use memory::{
    MemoryComputeControl, MemoryCredentialStore, MemoryDatabaseControl, MemoryEndpointCheck,
    MemoryFailure, MemoryNotificationChannel, MemoryRoutingControl, MemorySite, MemoryWriteCheck,
};
pub use notifier::Notifier;
pub use prober::{HealthProber, HttpEndpointCheck};
pub use recovery::{PendingRecovery, RecoveryDriver, RecoveryOutcome, RecoveryStrategy};
pub use retry::RetryPolicy;
pub use router::TrafficRouter;
pub use scaler::ComputeScaler;
pub use secrets::{ConnectionSecret, SecretRotator};
