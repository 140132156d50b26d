//! Run State Registry
//!
//! Tracks every in-flight run so that a restarted process can tell which
//! runs were interrupted. Entries move `running -> completed | failed |
//! stopped`; completed and failed entries are removed once the run has
//! been persisted, stopped (paused) entries are kept.
//!
//! The default file store keeps a JSON snapshot at
//! `{state_dir}/run_state.json`, rewritten after each change.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::FlowError;

/// Lifecycle status of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    /// Only `running` may move, and only to a final status.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        self == next
            || matches!(
                (self, next),
                (
                    RunStatus::Running,
                    RunStatus::Completed | RunStatus::Failed | RunStatus::Stopped
                )
            )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Registry entry for one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunStateEntry {
    pub flow_id: String,
    pub name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunStateEntry {
    /// A freshly started run.
    pub fn running(flow_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            flow_id: flow_id.into(),
            name: name.into(),
            status: RunStatus::Running,
            started_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied to an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatePatch {
    pub status: Option<RunStatus>,
    pub name: Option<String>,
}

impl RunStatePatch {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            name: None,
        }
    }
}

/// Storage backend for run state entries.
#[async_trait]
pub trait RunStateStore: Send + Sync {
    async fn restore(&self) -> Result<HashMap<String, RunStateEntry>, FlowError>;
    async fn add(&self, run_id: &str, entry: &RunStateEntry) -> Result<(), FlowError>;
    async fn update(&self, run_id: &str, entry: &RunStateEntry) -> Result<(), FlowError>;
    async fn delete(&self, run_id: &str) -> Result<(), FlowError>;
}

/// Keeps entries in memory only.
#[derive(Debug, Default)]
pub struct MemoryRunStateStore {
    entries: Mutex<HashMap<String, RunStateEntry>>,
}

impl MemoryRunStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStateStore for MemoryRunStateStore {
    async fn restore(&self) -> Result<HashMap<String, RunStateEntry>, FlowError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn add(&self, run_id: &str, entry: &RunStateEntry) -> Result<(), FlowError> {
        self.entries
            .lock()
            .await
            .insert(run_id.to_string(), entry.clone());
        Ok(())
    }

    async fn update(&self, run_id: &str, entry: &RunStateEntry) -> Result<(), FlowError> {
        self.add(run_id, entry).await
    }

    async fn delete(&self, run_id: &str) -> Result<(), FlowError> {
        self.entries.lock().await.remove(run_id);
        Ok(())
    }
}

/// Persists entries as a pretty JSON snapshot.
#[derive(Debug)]
pub struct FileRunStateStore {
    path: PathBuf,
    cache: Mutex<Option<HashMap<String, RunStateEntry>>>,
}

impl FileRunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<HashMap<String, RunStateEntry>, FlowError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, entries: &HashMap<String, RunStateEntry>) -> Result<(), FlowError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, json).await?;
        debug!("Saved run state to {}", self.path.display());
        Ok(())
    }

    /// Applies a change to the cached snapshot and rewrites the file.
    async fn modify<F>(&self, change: F) -> Result<(), FlowError>
    where
        F: FnOnce(&mut HashMap<String, RunStateEntry>) + Send,
    {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }

        if let Some(entries) = cache.as_mut() {
            change(entries);
            self.write_file(entries).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RunStateStore for FileRunStateStore {
    async fn restore(&self) -> Result<HashMap<String, RunStateEntry>, FlowError> {
        let entries = self.read_file().await?;
        info!(
            "Loaded {} run state entries from {}",
            entries.len(),
            self.path.display()
        );
        *self.cache.lock().await = Some(entries.clone());
        Ok(entries)
    }

    async fn add(&self, run_id: &str, entry: &RunStateEntry) -> Result<(), FlowError> {
        let entry = entry.clone();
        self.modify(move |entries| {
            entries.insert(run_id.to_string(), entry);
        })
        .await
    }

    async fn update(&self, run_id: &str, entry: &RunStateEntry) -> Result<(), FlowError> {
        self.add(run_id, entry).await
    }

    async fn delete(&self, run_id: &str) -> Result<(), FlowError> {
        self.modify(|entries| {
            entries.remove(run_id);
        })
        .await
    }
}

/// Run state service: validates transitions and stamps times before
/// writing through to a store.
pub struct RunState {
    store: Arc<dyn RunStateStore>,
    entries: Mutex<HashMap<String, RunStateEntry>>,
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState").finish_non_exhaustive()
    }
}

impl RunState {
    pub fn new(store: Arc<dyn RunStateStore>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A registry that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRunStateStore::new()))
    }

    /// A registry backed by a JSON file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileRunStateStore::new(path)))
    }

    /// Loads persisted entries.
    ///
    /// Entries still marked `running` belong to runs that never finished
    /// (the process died mid-run) and are marked `stopped`.
    pub async fn restore(&self) -> Result<HashMap<String, RunStateEntry>, FlowError> {
        let mut restored = self.store.restore().await?;

        for (run_id, entry) in restored.iter_mut() {
            if entry.status == RunStatus::Running {
                warn!("Run '{}' was interrupted; marking it stopped", run_id);
                entry.status = RunStatus::Stopped;
                entry.updated_at = Utc::now();
                self.store.update(run_id, entry).await?;
            }
        }

        let mut entries = self.entries.lock().await;
        *entries = restored.clone();
        Ok(restored)
    }

    pub async fn add(&self, run_id: &str, entry: RunStateEntry) -> Result<(), FlowError> {
        let mut entries = self.entries.lock().await;
        self.store.add(run_id, &entry).await?;
        entries.insert(run_id.to_string(), entry);
        Ok(())
    }

    /// Applies a patch, rejecting illegal status transitions.
    pub async fn update(
        &self,
        run_id: &str,
        patch: RunStatePatch,
    ) -> Result<RunStateEntry, FlowError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get(run_id)
            .cloned()
            .ok_or_else(|| FlowError::Persistence(format!("Unknown run '{}'", run_id)))?;

        let mut updated = entry.clone();
        if let Some(status) = patch.status {
            if !entry.status.can_transition_to(status) {
                return Err(FlowError::InvalidTransition {
                    run_id: run_id.to_string(),
                    from: entry.status.to_string(),
                    to: status.to_string(),
                });
            }
            updated.status = status;
        }
        if let Some(name) = patch.name {
            updated.name = name;
        }
        updated.updated_at = Utc::now();

        self.store.update(run_id, &updated).await?;
        entries.insert(run_id.to_string(), updated.clone());
        Ok(updated)
    }

    pub async fn delete(&self, run_id: &str) -> Result<(), FlowError> {
        let mut entries = self.entries.lock().await;
        self.store.delete(run_id).await?;
        entries.remove(run_id);
        Ok(())
    }

    pub async fn get(&self, run_id: &str) -> Option<RunStateEntry> {
        self.entries.lock().await.get(run_id).cloned()
    }

    /// Copy of every known entry.
    pub async fn snapshot(&self) -> HashMap<String, RunStateEntry> {
        self.entries.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_transitions() {
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Stopped));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Stopped.can_transition_to(RunStatus::Failed));
    }

    #[tokio::test]
    async fn test_lifecycle_in_memory() {
        let state = RunState::in_memory();
        state.add("r1", RunStateEntry::running("flow", "Flow")).await.unwrap();

        let updated = state
            .update("r1", RunStatePatch::status(RunStatus::Completed))
            .await
            .unwrap();
        assert_eq!(updated.status, RunStatus::Completed);
        assert!(updated.updated_at >= updated.started_at);

        state.delete("r1").await.unwrap();
        assert!(state.get("r1").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_transition() {
        let state = RunState::in_memory();
        state.add("r1", RunStateEntry::running("f", "f")).await.unwrap();
        state
            .update("r1", RunStatePatch::status(RunStatus::Failed))
            .await
            .unwrap();

        let result = state
            .update("r1", RunStatePatch::status(RunStatus::Running))
            .await;
        assert!(matches!(result, Err(FlowError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_update_unknown_run() {
        let state = RunState::in_memory();
        let result = state.update("ghost", RunStatePatch::default()).await;
        assert!(matches!(result, Err(FlowError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_file_store_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("run_state.json");

        {
            let state = RunState::file(&path);
            state.add("r1", RunStateEntry::running("f", "first")).await.unwrap();
            state.add("r2", RunStateEntry::running("f", "second")).await.unwrap();
            state
                .update("r2", RunStatePatch::status(RunStatus::Stopped))
                .await
                .unwrap();
        }

        assert!(path.exists());

        let state = RunState::file(&path);
        let restored = state.restore().await.unwrap();
        assert_eq!(restored.len(), 2);
        // r1 was still running when the first instance went away
        assert_eq!(restored["r1"].status, RunStatus::Stopped);
        assert_eq!(restored["r2"].name, "second");

        let reloaded = FileRunStateStore::new(&path).restore().await.unwrap();
        assert_eq!(reloaded["r1"].status, RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_file_store_delete() {
        let dir = tempdir().unwrap();
        let store = FileRunStateStore::new(dir.path().join("run_state.json"));

        store.add("a", &RunStateEntry::running("f", "f")).await.unwrap();
        store.delete("a").await.unwrap();

        let fresh = FileRunStateStore::new(store.path());
        assert!(fresh.restore().await.unwrap().is_empty());
    }
}
