use std::sync::Arc;

use parking_lot::Mutex;

use drlab_core::{DrResult, ExecutionId, FailoverError};

/// Single-slot registry enforcing the at-most-one-running-execution
/// invariant.
///
/// Claiming the slot while another execution holds it fails with
/// `ExecutionInProgress`; requests are rejected, never queued. The slot is
/// released when the returned [`ExecutionSlot`] drops, so panics unwinding
/// out of a step still free it.
#[derive(Clone)]
pub struct ExecutionRegistry {
    current: Arc<Mutex<Option<ExecutionId>>>,
}

impl ExecutionRegistry {
    /// An empty registry.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Claims the slot for an execution (compare-and-set on empty).
    pub fn claim(&self, execution_id: ExecutionId) -> DrResult<ExecutionSlot> {
        let mut current = self.current.lock();
        if let Some(running) = *current {
            return Err(FailoverError::ExecutionInProgress {
                execution_id: running.to_string(),
            });
        }
        *current = Some(execution_id);
        Ok(ExecutionSlot {
            registry: self.current.clone(),
            execution_id,
        })
    }

    /// Identifier of the currently running execution, if any.
    #[must_use]
    pub fn running(&self) -> Option<ExecutionId> {
        *self.current.lock()
    }
}

/// Guard for a claimed execution slot; releases on drop.
#[derive(Debug)]
pub struct ExecutionSlot {
    registry: Arc<Mutex<Option<ExecutionId>>>,
    execution_id: ExecutionId,
}

impl ExecutionSlot {
    /// Explicit release, for readability at terminal paths.
    pub fn release(self) {}
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        let mut current = self.registry.lock();
        if *current == Some(self.execution_id) {
            *current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_not_queued() {
        let registry = ExecutionRegistry::new();
        let first = ExecutionId::new();
        let slot = registry.claim(first).unwrap();

        let err = registry.claim(ExecutionId::new()).unwrap_err();
        match err {
            FailoverError::ExecutionInProgress { execution_id } => {
                assert_eq!(execution_id, first.to_string());
            }
            other => panic!("expected ExecutionInProgress, got {other}"),
        }

        drop(slot);
        assert!(registry.claim(ExecutionId::new()).is_ok());
    }

    #[test]
    fn slot_releases_on_drop_even_without_explicit_release() {
        let registry = ExecutionRegistry::new();
        {
            let _slot = registry.claim(ExecutionId::new()).unwrap();
            assert!(registry.running().is_some());
        }
        assert!(registry.running().is_none());
    }
}
