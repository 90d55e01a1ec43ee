use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use drlab_core::{DrResult, ExecutionId, ExecutionStore, FailoverError, FailoverExecution};

/// In-memory execution store for drills and tests.
pub struct MemoryExecutionStore {
    records: RwLock<HashMap<ExecutionId, FailoverExecution>>,
}

impl MemoryExecutionStore {
    /// An empty store.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn record(&self, execution: &FailoverExecution) -> DrResult<()> {
        let mut records = self.records.write();
        if let Some(existing) = records.get(&execution.execution_id) {
            if existing.is_terminal() {
                return Err(FailoverError::internal(format!(
                    "execution `{}` already has a terminal record",
                    execution.execution_id
                )));
            }
        }
        records.insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load(&self, execution_id: ExecutionId) -> DrResult<Option<FailoverExecution>> {
        Ok(self.records.read().get(&execution_id).cloned())
    }

    async fn list(&self) -> DrResult<Vec<ExecutionId>> {
        let mut ids: Vec<_> = self.records.read().keys().copied().collect();
        ids.sort_by_key(|id| id.as_uuid());
        Ok(ids)
    }
}

/// File-backed execution store: one pretty-printed JSON document per
/// execution under the data directory.
///
/// Terminal records are immutable; recording over an existing terminal
/// record is refused, preserving the append-only audit guarantee.
pub struct JsonFileExecutionStore {
    data_dir: PathBuf,
}

impl JsonFileExecutionStore {
    /// A store rooted at `data_dir` (created on first write).
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, execution_id: ExecutionId) -> PathBuf {
        self.data_dir.join(format!("{execution_id}.json"))
    }
}

#[async_trait]
impl ExecutionStore for JsonFileExecutionStore {
    async fn record(&self, execution: &FailoverExecution) -> DrResult<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.path_for(execution.execution_id);

        if let Ok(existing) = tokio::fs::read(&path).await {
            let existing: FailoverExecution = serde_json::from_slice(&existing)?;
            if existing.is_terminal() {
                return Err(FailoverError::internal(format!(
                    "execution `{}` already has a terminal record",
                    execution.execution_id
                )));
            }
        }

        let json = serde_json::to_vec_pretty(execution)?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), "execution record written");
        Ok(())
    }

    async fn load(&self, execution_id: ExecutionId) -> DrResult<Option<FailoverExecution>> {
        let path = self.path_for(execution_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> DrResult<Vec<ExecutionId>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(id) = stem.parse() {
                ids.push(id);
            }
        }
        ids.sort_by_key(|id: &ExecutionId| id.as_uuid());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drlab_core::{ExecutionStatus, FailoverMode, FailoverRequest};

    fn terminal_execution() -> FailoverExecution {
        let mut exec =
            FailoverExecution::new(&FailoverRequest::new(FailoverMode::Planned, "drill"));
        exec.start();
        exec.complete(ExecutionStatus::Succeeded);
        exec
    }

    #[tokio::test]
    async fn file_store_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileExecutionStore::new(dir.path());

        let exec = terminal_execution();
        store.record(&exec).await.unwrap();

        let loaded = store.load(exec.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.execution_id, exec.execution_id);
        assert_eq!(loaded.status, ExecutionStatus::Succeeded);

        assert_eq!(store.list().await.unwrap(), vec![exec.execution_id]);
    }

    #[tokio::test]
    async fn terminal_records_are_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileExecutionStore::new(dir.path());

        let exec = terminal_execution();
        store.record(&exec).await.unwrap();
        assert!(store.record(&exec).await.is_err());
    }

    #[tokio::test]
    async fn missing_record_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileExecutionStore::new(dir.path());
        assert!(store.load(ExecutionId::new()).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_rejects_double_terminal() {
        let store = MemoryExecutionStore::new();
        let exec = terminal_execution();
        store.record(&exec).await.unwrap();
        assert!(store.record(&exec).await.is_err());
    }
}
