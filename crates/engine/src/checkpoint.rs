//! Run checkpoints keyed by run id.
//!
//! A checkpoint is written after every completed step and holds the full
//! state together with the name of that step, so an interrupted run can
//! continue with the next step.

use crate::state::RunState;
use crate::step::Step;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("invalid run id: {0}")]
    InvalidRunId(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// One persisted record per in-flight run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub run_id: String,
    pub state: RunState,
    pub last_completed_step: Step,
    pub updated_at: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn new(run_id: impl Into<String>, state: RunState, last_completed_step: Step) -> Self {
        Self {
            run_id: run_id.into(),
            state,
            last_completed_step,
            updated_at: Utc::now(),
        }
    }
}

/// Saves and loads run checkpoints.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Reject run ids this store cannot key a record by.
    fn validate_id(&self, _run_id: &str) -> Result<(), CheckpointError> {
        Ok(())
    }

    /// Replace the checkpoint for `record.run_id`.
    async fn put(&self, record: &RunCheckpoint) -> Result<(), CheckpointError>;

    /// Load the checkpoint for a run, if one exists.
    async fn get(&self, run_id: &str) -> Result<Option<RunCheckpoint>, CheckpointError>;

    /// Remove a run's checkpoint. Removing a missing one is not an error.
    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError>;

    /// Ids of all runs with a checkpoint, sorted.
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;
}

/// In-memory checkpointer. Not persistent; for tests and single-process use.
#[derive(Default, Clone)]
pub struct MemoryCheckpointer {
    inner: Arc<RwLock<HashMap<String, RunCheckpoint>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn put(&self, record: &RunCheckpoint) -> Result<(), CheckpointError> {
        let mut guard = self.inner.write().await;
        guard.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunCheckpoint>, CheckpointError> {
        Ok(self.inner.read().await.get(run_id).cloned())
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.inner.write().await.remove(run_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// One JSON file per run under a directory.
///
/// Files are written to a temporary name and renamed into place, so a
/// reader never sees a partially written checkpoint.
#[derive(Debug, Clone)]
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf, CheckpointError> {
        validate_run_id(run_id)?;
        Ok(self.dir.join(format!("{}.json", run_id)))
    }
}

/// Run ids become file names; restrict them to a safe alphabet.
fn validate_run_id(run_id: &str) -> Result<(), CheckpointError> {
    let valid = !run_id.is_empty()
        && run_id.len() <= 128
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidRunId(run_id.to_string()))
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    fn validate_id(&self, run_id: &str) -> Result<(), CheckpointError> {
        validate_run_id(run_id)
    }

    async fn put(&self, record: &RunCheckpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&record.run_id)?;
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::Storage(format!("{:?}: {}", self.dir, e)))?;

        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", record.run_id, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| CheckpointError::Storage(format!("{:?}: {}", tmp, e)))?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CheckpointError::Storage(format!("{:?}: {}", path, e)));
        }

        tracing::trace!(
            "Checkpointed run {} after {}",
            record.run_id,
            record.last_completed_step
        );
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunCheckpoint>, CheckpointError> {
        let path = self.path_for(run_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::Storage(format!("{:?}: {}", path, e))),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CheckpointError::Serialization(format!("{:?}: {}", path, e)))
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(run_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::Storage(format!("{:?}: {}", path, e))),
        }
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CheckpointError::Storage(format!("{:?}: {}", self.dir, e))),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json") {
                if validate_run_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Document, WebSearchDecision};
    use tempfile::TempDir;

    fn record(run_id: &str, step: Step) -> RunCheckpoint {
        let mut state = RunState::new("What is LangGraph?");
        state.documents.push(Document::new("LangGraph builds agents."));
        state.needs_web_search = Some(WebSearchDecision::No);
        RunCheckpoint::new(run_id, state, step)
    }

    #[test]
    fn test_error_display() {
        assert!(CheckpointError::NotFound("r1".into())
            .to_string()
            .contains("not found"));
        assert!(CheckpointError::InvalidRunId("../x".into())
            .to_string()
            .contains("invalid run id"));
    }

    #[tokio::test]
    async fn test_memory_put_get_delete() {
        let saver = MemoryCheckpointer::new();
        saver.put(&record("r1", Step::Retrieve)).await.unwrap();
        saver.put(&record("r1", Step::GradeDocuments)).await.unwrap();

        let loaded = saver.get("r1").await.unwrap().unwrap();
        assert_eq!(loaded.last_completed_step, Step::GradeDocuments);
        assert_eq!(saver.list().await.unwrap(), vec!["r1".to_string()]);

        saver.delete("r1").await.unwrap();
        assert!(saver.get("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_round_trip_and_overwrite() {
        let temp = TempDir::new().unwrap();
        let saver = FileCheckpointer::new(temp.path().join("runs"));

        assert!(saver.get("r1").await.unwrap().is_none());
        assert!(saver.list().await.unwrap().is_empty());

        let first = record("r1", Step::Retrieve);
        saver.put(&first).await.unwrap();
        let second = record("r1", Step::GradeDocuments);
        saver.put(&second).await.unwrap();

        let loaded = saver.get("r1").await.unwrap().unwrap();
        assert_eq!(loaded, second);

        // No temporary files left behind
        let names: Vec<String> = std::fs::read_dir(saver.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["r1.json".to_string()]);
    }

    #[tokio::test]
    async fn test_file_delete_and_list() {
        let temp = TempDir::new().unwrap();
        let saver = FileCheckpointer::new(temp.path());

        saver.put(&record("b", Step::Retrieve)).await.unwrap();
        saver.put(&record("a", Step::Retrieve)).await.unwrap();
        assert_eq!(saver.list().await.unwrap(), vec!["a", "b"]);

        saver.delete("a").await.unwrap();
        saver.delete("a").await.unwrap();
        assert_eq!(saver.list().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_file_rejects_path_like_ids() {
        let temp = TempDir::new().unwrap();
        let saver = FileCheckpointer::new(temp.path());

        let err = saver.get("../escape").await.unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidRunId(_)));
        assert!(saver.put(&record("a/b", Step::Retrieve)).await.is_err());
    }

    #[test]
    fn test_validate_id_per_store() {
        let temp = TempDir::new().unwrap();
        let file = FileCheckpointer::new(temp.path());
        assert!(file.validate_id("run-1_a").is_ok());
        assert!(matches!(
            file.validate_id("my run"),
            Err(CheckpointError::InvalidRunId(_))
        ));
        assert!(MemoryCheckpointer::new().validate_id("my run").is_ok());
    }

    #[tokio::test]
    async fn test_file_corrupt_record_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("bad.json"), "{not json").unwrap();
        let saver = FileCheckpointer::new(temp.path());

        let err = saver.get("bad").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Serialization(_)));
    }
}
