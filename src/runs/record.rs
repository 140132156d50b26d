//! Run Records
//!
//! A record summarizes one finished run. Records are written only for runs
//! that reached a terminal state; paused runs are never persisted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::FlowError;
use crate::monitoring::RunLogEntry;

/// Persisted summary of a finished run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: String,
    pub flow_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub entries: Vec<RunLogEntry>,
}

/// Storage for finished runs.
#[async_trait]
pub trait RunPersistence: Send + Sync {
    async fn append_run(&self, record: &RunRecord) -> Result<(), FlowError>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryRunPersistence {
    records: Mutex<Vec<RunRecord>>,
}

impl MemoryRunPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<RunRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RunPersistence for MemoryRunPersistence {
    async fn append_run(&self, record: &RunRecord) -> Result<(), FlowError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Appends one JSON record per line.
#[derive(Debug)]
pub struct JsonlRunPersistence {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRunPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back every record in the file.
    pub async fn load_all(&self) -> Result<Vec<RunRecord>, FlowError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(FlowError::from))
            .collect()
    }
}

#[async_trait]
impl RunPersistence for JsonlRunPersistence {
    async fn append_run(&self, record: &RunRecord) -> Result<(), FlowError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!("Saved run '{}' to {}", record.id, self.path.display());
        Ok(())
    }
}
