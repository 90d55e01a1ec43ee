use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ExecutionId;
use crate::request::{FailoverMode, FailoverRequest};

/// Lifecycle status of a failover execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Accepted but not yet started.
    Pending,
    /// The state machine is driving steps.
    Running,
    /// All steps completed and post-checks passed.
    Succeeded,
    /// A step failed fatally; recovery actions may have run.
    Failed,
    /// Refused before any recovery action (e.g. primary still healthy).
    Aborted,
}

impl ExecutionStatus {
    /// Returns the canonical lowercase string used in records and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether this status ends the execution.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of the failover state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    Init,
    CheckPrimaryHealth,
    DecideRecoveryPath,
    RecoverDatabase,
    RotateSecret,
    ScaleSecondaryCompute,
    SwitchTraffic,
    PostCheck,
    Notify,
}

impl StepName {
    /// Returns the canonical kebab-case string used in records and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::CheckPrimaryHealth => "check-primary-health",
            Self::DecideRecoveryPath => "decide-recovery-path",
            Self::RecoverDatabase => "recover-database",
            Self::RotateSecret => "rotate-secret",
            Self::ScaleSecondaryCompute => "scale-secondary-compute",
            Self::SwitchTraffic => "switch-traffic",
            Self::PostCheck => "post-check",
            Self::Notify => "notify",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    /// The attempt completed.
    Success,
    /// The attempt failed but the step may be retried.
    RetryableFailure,
    /// The attempt failed and the execution must halt.
    FatalFailure,
}

/// Non-fatal condition recorded alongside a successful step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum StepWarning {
    /// The standby scaled but fewer tasks than desired were healthy when
    /// the scale budget ran out; traffic was switched anyway.
    PartialCapacity {
        /// Healthy task count observed at the deadline.
        healthy: u32,
        /// Desired task count.
        desired: u32,
    },
}

/// Record of one step attempt, appended to the execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Which step this attempt belongs to.
    pub step: StepName,
    /// 1-based attempt number, monotonically increasing per step.
    pub attempt: u32,
    /// How the attempt ended.
    pub outcome: StepOutcome,
    /// Human-readable detail (error text, endpoints, counts).
    pub detail: String,
    /// Non-fatal warning attached to a successful attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<StepWarning>,
    /// When the attempt finished, in UTC.
    pub timestamp: DateTime<Utc>,
}

/// Mutable run record owned by the orchestrator for one failover attempt.
///
/// Steps append to `step_history`; the record becomes immutable once a
/// terminal status is set and is then persisted for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverExecution {
    /// Unique identifier for this execution.
    pub execution_id: ExecutionId,
    /// Trigger mode copied from the request.
    pub mode: FailoverMode,
    /// Free-text reason copied from the request.
    pub reason: String,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// Step the state machine is currently in.
    pub current_step: StepName,
    /// When the execution started, in UTC.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Append-only history of every step attempt.
    pub step_history: Vec<StepResult>,
}

impl FailoverExecution {
    /// Creates a pending execution from an accepted request.
    #[must_use]
    pub fn new(request: &FailoverRequest) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            mode: request.mode,
            reason: request.reason.clone(),
            status: ExecutionStatus::Pending,
            current_step: StepName::Init,
            started_at: Utc::now(),
            completed_at: None,
            step_history: Vec::new(),
        }
    }

    /// Marks the execution as running and stamps the start time.
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Utc::now();
    }

    /// Moves the state machine to the given step.
    pub fn enter_step(&mut self, step: StepName) {
        self.current_step = step;
    }

    /// Appends one step attempt to the history.
    ///
    /// Attempt numbers per step must be strictly increasing; the next
    /// attempt number comes from [`Self::next_attempt`].
    pub fn record_step(
        &mut self,
        step: StepName,
        attempt: u32,
        outcome: StepOutcome,
        detail: impl Into<String>,
        warning: Option<StepWarning>,
    ) {
        debug_assert!(
            attempt
                > self
                    .step_history
                    .iter()
                    .filter(|r| r.step == step)
                    .map(|r| r.attempt)
                    .max()
                    .unwrap_or(0),
            "attempt numbers must increase per step"
        );
        self.step_history.push(StepResult {
            step,
            attempt,
            outcome,
            detail: detail.into(),
            warning,
            timestamp: Utc::now(),
        });
    }

    /// Returns the next attempt number for a step (1-based).
    #[must_use]
    pub fn next_attempt(&self, step: StepName) -> u32 {
        self.step_history
            .iter()
            .filter(|r| r.step == step)
            .map(|r| r.attempt)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Sets a terminal status exactly once and stamps completion time.
    pub fn complete(&mut self, status: ExecutionStatus) {
        debug_assert!(status.is_terminal(), "complete() requires a terminal status");
        debug_assert!(
            !self.status.is_terminal(),
            "execution already reached a terminal status"
        );
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Whether the execution has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock seconds from start to completion (or to now while running).
    #[must_use]
    pub fn elapsed_seconds(&self) -> i64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0)
    }

    /// Last recorded result for a step, if any.
    #[must_use]
    pub fn last_result(&self, step: StepName) -> Option<&StepResult> {
        self.step_history.iter().rev().find(|r| r.step == step)
    }
}
