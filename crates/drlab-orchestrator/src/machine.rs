use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, warn};

use drlab_core::{
    ComputeControl, CredentialStore, DatabaseControl, DrConfig, DrResult, EndpointCheck,
    ExecutionStatus, ExecutionStore, FailoverError, FailoverExecution, FailoverReport,
    FailoverRequest, FailoverMode, NotificationChannel, OperationStatus, RecoveryTarget,
    RoutingControl, StepName, StepOutcome, StepWarning, WriteCheck,
};
use drlab_drivers::{
    ComputeScaler, HealthProber, Notifier, RecoveryDriver, RecoveryOutcome, RecoveryStrategy,
    RetryPolicy, SecretRotator, TrafficRouter,
};

use crate::registry::ExecutionRegistry;

/// Collaborator handles the orchestrator drives.
///
/// All are externally supplied infrastructure interfaces; the orchestrator
/// owns sequencing, retries, and timeouts, never the resources themselves.
pub struct OrchestratorHandles {
    pub database: Arc<dyn DatabaseControl>,
    pub credentials: Arc<dyn CredentialStore>,
    pub compute: Arc<dyn ComputeControl>,
    pub routing: Arc<dyn RoutingControl>,
    pub notifications: Arc<dyn NotificationChannel>,
    /// Health check for the primary application endpoint.
    pub primary_check: Arc<dyn EndpointCheck>,
    /// Health check for the secondary application endpoint (post-checks).
    pub secondary_check: Arc<dyn EndpointCheck>,
    /// Synthetic write probe against the recovered database.
    pub write_check: Arc<dyn WriteCheck>,
    /// Audit persistence for terminal execution records.
    pub store: Arc<dyn ExecutionStore>,
}

/// Cooperative cancellation handle for a running orchestrator.
///
/// Cancellation is honored only before recovery begins; after that the
/// request is recorded as refused and the execution runs to terminal.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Sequences one failover execution end-to-end:
/// health check, recovery-path decision, database recovery, secret
/// rotation, compute scale-up, traffic switch, post-checks, notification.
///
/// One orchestrator processes one execution at a time; concurrent requests
/// are rejected through the execution registry. Long-running external
/// operations are polled under per-step budgets so the whole machine runs
/// on a single task without blocking a thread.
pub struct FailoverOrchestrator {
    handles: OrchestratorHandles,
    config: DrConfig,
    target: RecoveryTarget,
    registry: ExecutionRegistry,
    cancel: Arc<AtomicBool>,
}

impl FailoverOrchestrator {
    /// Builds an orchestrator over collaborator handles.
    #[must_use]
    pub fn new(handles: OrchestratorHandles, config: DrConfig, target: RecoveryTarget) -> Self {
        Self {
            handles,
            config,
            target,
            registry: ExecutionRegistry::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Uses a shared registry so several entry points (CLI, automation)
    /// contend for the same single execution slot.
    #[must_use]
    pub fn with_registry(mut self, registry: ExecutionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Handle for cooperative cancellation of the running execution.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: self.cancel.clone(),
        }
    }

    /// Drives one failover request to a terminal state and reports.
    ///
    /// Returns `Err` only for rejected requests (slot already taken,
    /// unusable target); once an execution starts it always reaches
    /// exactly one terminal status and publishes exactly one notification,
    /// and `Ok(report)` describes the outcome even when that outcome is
    /// `Failed` or `Aborted`.
    pub async fn run(&self, request: FailoverRequest) -> DrResult<FailoverReport> {
        self.target.validate()?;

        let mut execution = FailoverExecution::new(&request);
        let slot = self.registry.claim(execution.execution_id)?;
        execution.start();
        info!(
            execution_id = %execution.execution_id,
            mode = %request.mode,
            reason = request.reason.as_str(),
            "failover execution started"
        );

        let mut recovery: Option<RecoveryOutcome> = None;
        let overall = std::time::Duration::from_secs(self.config.budget.overall_secs);
        let status =
            match tokio::time::timeout(overall, self.drive(&mut execution, &mut recovery)).await {
                Ok(status) => status,
                Err(_) => {
                    let step = execution.current_step;
                    let attempt = execution.next_attempt(step);
                    execution.record_step(
                        step,
                        attempt,
                        StepOutcome::FatalFailure,
                        format!(
                            "overall budget of {}s exceeded",
                            self.config.budget.overall_secs
                        ),
                        None,
                    );
                    ExecutionStatus::Failed
                }
            };

        execution.enter_step(StepName::Notify);
        execution.complete(status);

        let rpo = recovery.as_ref().map(|r| r.snapshot_age_secs.unwrap_or(0));
        let report = FailoverReport::from_execution(&execution, &self.target, rpo);
        self.notify(&mut execution, &report).await;
        self.persist(&execution).await;
        // Any unconsumed cancellation dies with this execution.
        self.cancel.store(false, Ordering::SeqCst);
        slot.release();

        info!(
            execution_id = %report.execution_id,
            status = %report.status,
            rto_actual_seconds = report.rto_actual_seconds,
            "failover execution terminal"
        );
        Ok(report)
    }

    /// Runs the pre-notify steps, recording every attempt, and returns the
    /// terminal status. Never returns while a step is unaccounted for.
    async fn drive(
        &self,
        exec: &mut FailoverExecution,
        recovery_out: &mut Option<RecoveryOutcome>,
    ) -> ExecutionStatus {
        // Init
        exec.enter_step(StepName::Init);
        exec.record_step(
            StepName::Init,
            1,
            StepOutcome::Success,
            format!("accepted {} failover: {}", exec.mode, exec.reason),
            None,
        );
        if self.cancel.load(Ordering::SeqCst) {
            exec.record_step(
                StepName::Init,
                2,
                StepOutcome::FatalFailure,
                "cancelled by operator before health check",
                None,
            );
            return ExecutionStatus::Aborted;
        }

        // CheckPrimaryHealth
        exec.enter_step(StepName::CheckPrimaryHealth);
        match self.check_primary_health(exec).await {
            Ok(()) => {}
            Err(status) => return status,
        }

        // DecideRecoveryPath + RecoverDatabase (with one-shot fallback)
        exec.enter_step(StepName::DecideRecoveryPath);
        let refused_note = if self.cancel.swap(false, Ordering::SeqCst) {
            let refusal = FailoverError::CancellationRefused {
                step: StepName::DecideRecoveryPath,
            };
            warn!(error = %refusal, "cancellation request ignored");
            format!("; {refusal}")
        } else {
            String::new()
        };
        let strategy = RecoveryStrategy::for_target(&self.target);
        exec.record_step(
            StepName::DecideRecoveryPath,
            1,
            StepOutcome::Success,
            format!("selected {} recovery path{}", strategy.mode(), refused_note),
            None,
        );

        exec.enter_step(StepName::RecoverDatabase);
        let outcome = match self.recover_database(exec, strategy).await {
            Ok(outcome) => outcome,
            Err(()) => return ExecutionStatus::Failed,
        };
        let new_db_endpoint = outcome.new_endpoint.clone();
        *recovery_out = Some(outcome);

        // RotateSecret
        exec.enter_step(StepName::RotateSecret);
        if self.rotate_secret(exec, &new_db_endpoint).await.is_err() {
            return ExecutionStatus::Failed;
        }

        // ScaleSecondaryCompute
        exec.enter_step(StepName::ScaleSecondaryCompute);
        if self.scale_secondary(exec).await.is_err() {
            return ExecutionStatus::Failed;
        }

        // SwitchTraffic
        exec.enter_step(StepName::SwitchTraffic);
        if self.switch_traffic(exec).await.is_err() {
            return ExecutionStatus::Failed;
        }

        // PostCheck
        exec.enter_step(StepName::PostCheck);
        if self.post_check(exec, &new_db_endpoint).await.is_err() {
            return ExecutionStatus::Failed;
        }

        ExecutionStatus::Succeeded
    }

    /// Planned executions record the verdict and proceed regardless;
    /// unplanned executions require the consecutive-failure threshold and
    /// abort when the primary still answers.
    async fn check_primary_health(
        &self,
        exec: &mut FailoverExecution,
    ) -> Result<(), ExecutionStatus> {
        let prober = HealthProber::new(self.handles.primary_check.clone(), &self.config.probe);
        let threshold = self.config.probe.failure_threshold;

        if exec.mode == FailoverMode::Planned {
            let verdict = prober.probe(&self.target.primary_endpoint).await;
            exec.record_step(
                StepName::CheckPrimaryHealth,
                1,
                StepOutcome::Success,
                format!(
                    "planned failover proceeds; primary healthy={}",
                    verdict.healthy
                ),
                None,
            );
            return Ok(());
        }

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                let attempt = exec.next_attempt(StepName::CheckPrimaryHealth);
                exec.record_step(
                    StepName::CheckPrimaryHealth,
                    attempt,
                    StepOutcome::FatalFailure,
                    "cancelled by operator during health confirmation",
                    None,
                );
                return Err(ExecutionStatus::Aborted);
            }

            let verdict = prober.probe(&self.target.primary_endpoint).await;
            if verdict.healthy {
                let attempt = exec.next_attempt(StepName::CheckPrimaryHealth);
                let err = FailoverError::PrimaryStillHealthy {
                    consecutive_failures: verdict.consecutive_failures,
                };
                exec.record_step(
                    StepName::CheckPrimaryHealth,
                    attempt,
                    StepOutcome::FatalFailure,
                    err.to_string(),
                    None,
                );
                warn!("unplanned failover aborted: primary still healthy");
                return Err(ExecutionStatus::Aborted);
            }
            if verdict.is_down(threshold) {
                let attempt = exec.next_attempt(StepName::CheckPrimaryHealth);
                exec.record_step(
                    StepName::CheckPrimaryHealth,
                    attempt,
                    StepOutcome::Success,
                    format!(
                        "primary confirmed down after {} consecutive failures",
                        verdict.consecutive_failures
                    ),
                    None,
                );
                return Ok(());
            }
            tokio::time::sleep(self.config.probe.poll_interval()).await;
        }
    }

    /// Starts and polls the recovery operation, retrying the whole step up
    /// to the configured cap and falling back from replica to snapshot once.
    async fn recover_database(
        &self,
        exec: &mut FailoverExecution,
        mut strategy: RecoveryStrategy,
    ) -> Result<RecoveryOutcome, ()> {
        let driver = RecoveryDriver::new(self.handles.database.clone());
        let max_attempts = self.config.retry.recovery_attempts;
        let mut attempts_on_strategy = 0u32;
        let mut fallback_available =
            self.target.snapshot_fallback && strategy.mode() == drlab_core::DbMode::Replica;

        loop {
            attempts_on_strategy += 1;
            let attempt = exec.next_attempt(StepName::RecoverDatabase);
            match self.attempt_recovery(&driver, &strategy).await {
                Ok(outcome) => {
                    exec.record_step(
                        StepName::RecoverDatabase,
                        attempt,
                        StepOutcome::Success,
                        match outcome.snapshot_age_secs {
                            Some(age) => format!(
                                "snapshot restored to {} (snapshot age {age}s)",
                                outcome.new_endpoint
                            ),
                            None => format!("replica promoted at {}", outcome.new_endpoint),
                        },
                        None,
                    );
                    return Ok(outcome);
                }
                Err(err @ FailoverError::ReplicaUnavailable { .. }) if fallback_available => {
                    exec.record_step(
                        StepName::RecoverDatabase,
                        attempt,
                        StepOutcome::RetryableFailure,
                        err.to_string(),
                        None,
                    );
                    // Re-enter the decision with the snapshot path, once.
                    exec.enter_step(StepName::DecideRecoveryPath);
                    let decide_attempt = exec.next_attempt(StepName::DecideRecoveryPath);
                    exec.record_step(
                        StepName::DecideRecoveryPath,
                        decide_attempt,
                        StepOutcome::Success,
                        "replica unavailable; falling back to snapshot restore",
                        None,
                    );
                    exec.enter_step(StepName::RecoverDatabase);
                    strategy = RecoveryStrategy::snapshot_fallback(&self.target);
                    fallback_available = false;
                    attempts_on_strategy = 0;
                }
                Err(err) if err.is_retryable() && attempts_on_strategy < max_attempts => {
                    exec.record_step(
                        StepName::RecoverDatabase,
                        attempt,
                        StepOutcome::RetryableFailure,
                        err.to_string(),
                        None,
                    );
                    warn!(error = %err, "recovery attempt failed, restarting step");
                }
                Err(err) => {
                    exec.record_step(
                        StepName::RecoverDatabase,
                        attempt,
                        StepOutcome::FatalFailure,
                        err.to_string(),
                        None,
                    );
                    error!(error = %err, "database recovery failed");
                    return Err(());
                }
            }
        }
    }

    /// One start-and-poll pass under the recovery budget.
    async fn attempt_recovery(
        &self,
        driver: &RecoveryDriver,
        strategy: &RecoveryStrategy,
    ) -> DrResult<RecoveryOutcome> {
        let pending = driver.start(strategy).await?;
        let deadline = Instant::now() + self.config.budget.recover();
        loop {
            match driver.poll(&pending).await? {
                OperationStatus::Complete { endpoint } => {
                    return Ok(RecoveryDriver::outcome(&pending, endpoint));
                }
                OperationStatus::Failed { reason } => {
                    return Err(FailoverError::OperationFailed { reason });
                }
                OperationStatus::InProgress => {
                    if self.cancel.swap(false, Ordering::SeqCst) {
                        let refusal = FailoverError::CancellationRefused {
                            step: StepName::RecoverDatabase,
                        };
                        warn!(error = %refusal, "running to terminal");
                    }
                    if Instant::now() >= deadline {
                        return Err(FailoverError::StepTimeout {
                            step: StepName::RecoverDatabase,
                            budget_secs: self.config.budget.recover_secs,
                        });
                    }
                    tokio::time::sleep(self.config.probe.poll_interval()).await;
                }
            }
        }
    }

    /// Applies the shared retry policy to secret rotation and records one
    /// step attempt per try.
    async fn rotate_secret(
        &self,
        exec: &mut FailoverExecution,
        new_db_endpoint: &str,
    ) -> Result<(), ()> {
        let rotator = SecretRotator::new(self.handles.credentials.clone());
        let policy = RetryPolicy::new(self.config.retry.secret.clone());
        let max_attempts = policy.max_attempts();

        let mut failures: Vec<(u32, String, bool)> = Vec::new();
        let result = policy
            .run(
                "rotate-secret",
                |_attempt| rotator.rotate(new_db_endpoint, &self.target.credential_ref),
                |attempt, err| failures.push((attempt, err.to_string(), err.is_retryable())),
            )
            .await;

        for (attempt, detail, retryable) in &failures {
            let exhausted = !retryable || *attempt >= max_attempts;
            exec.record_step(
                StepName::RotateSecret,
                *attempt,
                if exhausted {
                    StepOutcome::FatalFailure
                } else {
                    StepOutcome::RetryableFailure
                },
                detail.clone(),
                None,
            );
        }

        match result {
            Ok(()) => {
                let attempt = exec.next_attempt(StepName::RotateSecret);
                exec.record_step(
                    StepName::RotateSecret,
                    attempt,
                    StepOutcome::Success,
                    format!(
                        "secret `{}` now points at {}",
                        self.target.credential_ref, new_db_endpoint
                    ),
                    None,
                );
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "secret rotation exhausted retries");
                Err(())
            }
        }
    }

    /// Scales the standby service; a scale-wait timeout records a
    /// partial-capacity warning and proceeds rather than failing.
    async fn scale_secondary(&self, exec: &mut FailoverExecution) -> Result<(), ()> {
        let scaler = ComputeScaler::new(
            self.handles.compute.clone(),
            self.config.probe.poll_interval(),
        );
        let desired = self.target.target_task_count;

        let result = async {
            scaler.scale_to(&self.target.service_ref, desired).await?;
            scaler
                .await_healthy(&self.target.service_ref, desired, self.config.budget.scale())
                .await
        }
        .await;

        match result {
            Ok((true, healthy)) => {
                exec.record_step(
                    StepName::ScaleSecondaryCompute,
                    1,
                    StepOutcome::Success,
                    format!("{healthy} of {desired} tasks healthy"),
                    None,
                );
                Ok(())
            }
            Ok((false, healthy)) => {
                exec.record_step(
                    StepName::ScaleSecondaryCompute,
                    1,
                    StepOutcome::Success,
                    format!("{healthy} of {desired} tasks healthy at scale deadline"),
                    Some(StepWarning::PartialCapacity { healthy, desired }),
                );
                Ok(())
            }
            Err(err) => {
                exec.record_step(
                    StepName::ScaleSecondaryCompute,
                    1,
                    StepOutcome::FatalFailure,
                    err.to_string(),
                    None,
                );
                error!(error = %err, "compute scale-up failed");
                Err(())
            }
        }
    }

    /// Flips the record to the secondary endpoint under the routing budget.
    async fn switch_traffic(&self, exec: &mut FailoverExecution) -> Result<(), ()> {
        let router = TrafficRouter::new(self.handles.routing.clone());
        let result = tokio::time::timeout(
            self.config.budget.route(),
            router.switch_to(
                &self.target.record_ref,
                &self.target.secondary_region_endpoint,
            ),
        )
        .await
        .unwrap_or(Err(FailoverError::StepTimeout {
            step: StepName::SwitchTraffic,
            budget_secs: self.config.budget.route_secs,
        }));

        match result {
            Ok(changed) => {
                exec.record_step(
                    StepName::SwitchTraffic,
                    1,
                    StepOutcome::Success,
                    if changed {
                        format!(
                            "record `{}` switched to {}",
                            self.target.record_ref, self.target.secondary_region_endpoint
                        )
                    } else {
                        format!(
                            "record `{}` already pointed at {}",
                            self.target.record_ref, self.target.secondary_region_endpoint
                        )
                    },
                    None,
                );
                Ok(())
            }
            Err(err) => {
                exec.record_step(
                    StepName::SwitchTraffic,
                    1,
                    StepOutcome::FatalFailure,
                    err.to_string(),
                    None,
                );
                error!(error = %err, "traffic switch failed");
                Err(())
            }
        }
    }

    /// Synthetic health probe plus synthetic write test against the new
    /// target; both must pass.
    async fn post_check(
        &self,
        exec: &mut FailoverExecution,
        new_db_endpoint: &str,
    ) -> Result<(), ()> {
        let prober = HealthProber::new(self.handles.secondary_check.clone(), &self.config.probe);
        let checks = async {
            let verdict = prober.probe(&self.target.secondary_region_endpoint).await;
            if !verdict.healthy {
                return Err(FailoverError::internal(format!(
                    "synthetic health probe against {} failed",
                    self.target.secondary_region_endpoint
                )));
            }
            self.handles.write_check.write_test(new_db_endpoint).await
        };

        let result = tokio::time::timeout(self.config.budget.checks(), checks)
            .await
            .unwrap_or(Err(FailoverError::StepTimeout {
                step: StepName::PostCheck,
                budget_secs: self.config.budget.checks_secs,
            }));

        match result {
            Ok(()) => {
                exec.record_step(
                    StepName::PostCheck,
                    1,
                    StepOutcome::Success,
                    "health probe and write test passed against secondary",
                    None,
                );
                Ok(())
            }
            Err(err) => {
                exec.record_step(
                    StepName::PostCheck,
                    1,
                    StepOutcome::FatalFailure,
                    err.to_string(),
                    None,
                );
                error!(error = %err, "post-checks failed on the new target");
                Err(())
            }
        }
    }

    /// Publishes the terminal notification; a transport failure is
    /// recorded but never changes the terminal status.
    async fn notify(&self, exec: &mut FailoverExecution, report: &FailoverReport) {
        let notifier = Notifier::new(self.handles.notifications.clone());
        match notifier
            .publish_report(&self.target.topic_ref, report)
            .await
        {
            Ok(()) => {
                exec.record_step(
                    StepName::Notify,
                    1,
                    StepOutcome::Success,
                    format!("published to `{}`", self.target.topic_ref),
                    None,
                );
            }
            Err(err) => {
                exec.record_step(
                    StepName::Notify,
                    1,
                    StepOutcome::RetryableFailure,
                    err.to_string(),
                    None,
                );
                error!(error = %err, "terminal notification failed to publish");
            }
        }
    }

    /// Persists the terminal record; persistence failure is logged, not
    /// propagated, so the caller still receives the report.
    async fn persist(&self, exec: &FailoverExecution) {
        if let Err(err) = self.handles.store.record(exec).await {
            error!(
                execution_id = %exec.execution_id,
                error = %err,
                "failed to persist execution record"
            );
        }
    }
}
