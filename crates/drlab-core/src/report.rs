use serde::{Deserialize, Serialize};

use crate::execution::{
    ExecutionStatus, FailoverExecution, StepName, StepOutcome, StepResult,
};
use crate::ids::ExecutionId;
use crate::request::FailoverMode;
use crate::target::RecoveryTarget;

/// Terminal result published for every execution.
///
/// This is the audit record used to measure actual RTO/RPO against the
/// targets configured in [`RecoveryTarget`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverReport {
    /// Execution this report describes.
    pub execution_id: ExecutionId,
    /// Trigger mode of the execution.
    pub mode: FailoverMode,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Wall-clock seconds from start to terminal.
    pub rto_actual_seconds: i64,
    /// Data-loss window in seconds: snapshot age on the snapshot path,
    /// zero for replica promotion, absent when recovery never completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpo_actual_seconds: Option<i64>,
    /// Configured recovery time objective.
    pub rto_target_seconds: u64,
    /// Configured recovery point objective.
    pub rpo_target_seconds: u64,
    /// Step the execution failed or aborted at, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<StepName>,
    /// Reason for the failure or abort, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Full append-only step history.
    pub step_history: Vec<StepResult>,
}

impl FailoverReport {
    /// Builds the report for a terminal execution.
    #[must_use]
    pub fn from_execution(
        execution: &FailoverExecution,
        target: &RecoveryTarget,
        rpo_actual_seconds: Option<i64>,
    ) -> Self {
        let failed = execution
            .step_history
            .iter()
            .rev()
            .find(|r| r.outcome == StepOutcome::FatalFailure);
        Self {
            execution_id: execution.execution_id,
            mode: execution.mode,
            status: execution.status,
            rto_actual_seconds: execution.elapsed_seconds(),
            rpo_actual_seconds,
            rto_target_seconds: target.rto_target_seconds,
            rpo_target_seconds: target.rpo_target_seconds,
            failed_step: failed.map(|r| r.step),
            failure_reason: failed.map(|r| r.detail.clone()),
            step_history: execution.step_history.clone(),
        }
    }

    /// Whether measured recovery time met the objective.
    #[must_use]
    pub fn rto_met(&self) -> bool {
        self.rto_actual_seconds >= 0 && (self.rto_actual_seconds as u64) <= self.rto_target_seconds
    }

    /// Whether the measured data-loss window met the objective.
    ///
    /// `None` (recovery never completed) counts as not met unless the
    /// execution was aborted before any recovery action ran.
    #[must_use]
    pub fn rpo_met(&self) -> bool {
        match self.rpo_actual_seconds {
            Some(secs) => secs >= 0 && (secs as u64) <= self.rpo_target_seconds,
            None => self.status == ExecutionStatus::Aborted,
        }
    }

    /// Multi-line human summary used as the notification body.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Failover execution {}", self.execution_id),
            format!("  mode:    {}", self.mode),
            format!("  status:  {}", self.status),
            format!(
                "  RTO:     {}s actual / {}s target ({})",
                self.rto_actual_seconds,
                self.rto_target_seconds,
                if self.rto_met() { "met" } else { "missed" }
            ),
        ];
        match self.rpo_actual_seconds {
            Some(secs) => lines.push(format!(
                "  RPO:     {}s actual / {}s target ({})",
                secs,
                self.rpo_target_seconds,
                if self.rpo_met() { "met" } else { "missed" }
            )),
            None => lines.push("  RPO:     n/a (recovery did not complete)".to_string()),
        }
        if let (Some(step), Some(reason)) = (self.failed_step, self.failure_reason.as_deref()) {
            lines.push(format!("  failed:  {step}: {reason}"));
        }
        lines.push(format!("  steps:   {} attempt(s) recorded", self.step_history.len()));
        for result in &self.step_history {
            lines.push(format!(
                "    [{}] {} #{} {:?}{}",
                result.timestamp.format("%H:%M:%S"),
                result.step,
                result.attempt,
                result.outcome,
                if result.warning.is_some() {
                    " (warning)"
                } else {
                    ""
                }
            ));
        }
        lines.join("\n")
    }
}
