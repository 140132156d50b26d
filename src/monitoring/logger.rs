//! Run Logger
//!
//! Append-only record of step outcomes for a single run. Each entry is
//! mirrored to the `log` facade, and typed diagnostic events can be
//! forwarded to an optional overlay sink.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

/// Outcome recorded for a step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
    Retrying,
    Warning,
    Paused,
}

/// A single entry in a run log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunLogEntry {
    /// Step id, or a machine code such as `dag-cycle` for run-level entries
    pub step_id: String,
    pub status: LogStatus,
    pub message: String,
    /// Elapsed time of the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub took_ms: Option<u64>,
    /// Screenshot reference captured on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RunLogEntry {
    pub fn new(step_id: impl Into<String>, status: LogStatus, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            message: message.into(),
            took_ms: None,
            screenshot: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_took_ms(mut self, took_ms: u64) -> Self {
        self.took_ms = Some(took_ms);
        self
    }

    pub fn with_screenshot(mut self, screenshot: Option<String>) -> Self {
        self.screenshot = screenshot;
        self
    }
}

/// Typed events for an on-page diagnostic overlay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    StepStarted { step_id: String },
    StepSucceeded { step_id: String, took_ms: u64 },
    StepFailed { step_id: String, reason: String },
    Paused { step_id: String },
    RunFinished { success: bool },
}

/// What to do when the overlay rejects an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkPolicy {
    #[default]
    Ignore,
    RetryOnce,
}

/// Receiver of diagnostic events, e.g. an in-page overlay.
pub trait OverlaySink: Send + Sync {
    fn show(&self, event: &DiagnosticEvent) -> Result<(), String>;
}

/// Collects log entries for one run.
#[derive(Default, Clone)]
pub struct RunLogger {
    entries: Vec<RunLogEntry>,
    sink: Option<Arc<dyn OverlaySink>>,
}

impl std::fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogger")
            .field("entries", &self.entries.len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl RunLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Option<Arc<dyn OverlaySink>>) -> Self {
        Self {
            entries: Vec::new(),
            sink,
        }
    }

    /// Appends an entry and mirrors it to the `log` facade.
    pub fn push(&mut self, entry: RunLogEntry) {
        match entry.status {
            LogStatus::Success => info!("[{}] {}", entry.step_id, entry.message),
            LogStatus::Paused => info!("[{}] paused: {}", entry.step_id, entry.message),
            LogStatus::Retrying | LogStatus::Warning => {
                warn!("[{}] {}", entry.step_id, entry.message)
            }
            LogStatus::Failed => error!("[{}] {}", entry.step_id, entry.message),
        }
        self.entries.push(entry);
    }

    pub fn success(&mut self, step_id: &str, message: impl Into<String>, took_ms: u64) {
        self.push(RunLogEntry::new(step_id, LogStatus::Success, message).with_took_ms(took_ms));
    }

    pub fn failed(
        &mut self,
        step_id: &str,
        message: impl Into<String>,
        took_ms: Option<u64>,
        screenshot: Option<String>,
    ) {
        let mut entry =
            RunLogEntry::new(step_id, LogStatus::Failed, message).with_screenshot(screenshot);
        entry.took_ms = took_ms;
        self.push(entry);
    }

    pub fn retrying(&mut self, step_id: &str, message: impl Into<String>) {
        self.push(RunLogEntry::new(step_id, LogStatus::Retrying, message));
    }

    pub fn warning(&mut self, step_id: &str, message: impl Into<String>) {
        self.push(RunLogEntry::new(step_id, LogStatus::Warning, message));
    }

    pub fn paused(&mut self, step_id: &str, message: impl Into<String>) {
        self.push(RunLogEntry::new(step_id, LogStatus::Paused, message));
    }

    /// Forwards an event to the overlay, if one is attached.
    ///
    /// Delivery is best effort: a rejected event is retried at most once
    /// under [`SinkPolicy::RetryOnce`] and then dropped.
    pub fn notify(&self, event: DiagnosticEvent, policy: SinkPolicy) {
        let Some(sink) = &self.sink else {
            return;
        };

        let mut result = sink.show(&event);
        if result.is_err() && policy == SinkPolicy::RetryOnce {
            result = sink.show(&event);
        }

        if let Err(e) = result {
            debug!("Overlay dropped {:?}: {}", event, e);
        }
    }

    pub fn entries(&self) -> &[RunLogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<RunLogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with the given status, in order.
    pub fn with_status(&self, status: LogStatus) -> impl Iterator<Item = &RunLogEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }
}
