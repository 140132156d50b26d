//! Execution Context
//!
//! Mutable state owned by a single run: the variable bag, the run log,
//! counters, the global deadline and the cooperative pause flag. Every
//! executor, control-flow iteration and deferred task of the run receives
//! the same context.

use tokio::time::{Duration, Instant};

use crate::error::FlowError;
use crate::flow::Variables;
use crate::monitoring::RunLogger;

/// Step counters reported in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Step executions dispatched to an executor
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Per-run execution context.
#[derive(Debug)]
pub struct ExecCtx {
    pub run_id: String,
    pub flow_id: String,
    pub vars: Variables,
    pub logger: RunLogger,
    pub stats: StepStats,
    /// Capture a screenshot whenever a step fails
    pub screenshot_on_fail: bool,
    /// Screenshot references captured for failed steps
    pub failure_screenshots: Vec<String>,
    timeout_ms: Option<u64>,
    deadline: Option<Instant>,
    pause_requested: bool,
    paused_at: Option<String>,
}

impl ExecCtx {
    pub fn new(run_id: impl Into<String>, flow_id: impl Into<String>, logger: RunLogger) -> Self {
        Self {
            run_id: run_id.into(),
            flow_id: flow_id.into(),
            vars: Variables::new(),
            logger,
            stats: StepStats::default(),
            screenshot_on_fail: false,
            failure_screenshots: Vec::new(),
            timeout_ms: None,
            deadline: None,
            pause_requested: false,
            paused_at: None,
        }
    }

    /// Starts the global deadline clock.
    pub fn set_timeout(&mut self, timeout_ms: Option<u64>) {
        self.timeout_ms = timeout_ms;
        self.deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    /// Fails with [`FlowError::GlobalTimeout`] once the deadline has passed.
    pub fn check_deadline(&self) -> Result<(), FlowError> {
        match self.timeout_ms {
            Some(ms) if self.deadline_exceeded() => Err(FlowError::GlobalTimeout(ms)),
            _ => Ok(()),
        }
    }

    /// Asks the run to pause at the next check point.
    pub fn request_pause(&mut self) {
        self.pause_requested = true;
    }

    pub fn pause_requested(&self) -> bool {
        self.pause_requested
    }

    /// Records that the run paused before `step_id`.
    pub fn mark_paused(&mut self, step_id: &str) {
        self.paused_at = Some(step_id.to_string());
    }

    /// Step the run paused before, if it paused.
    pub fn paused_at(&self) -> Option<&str> {
        self.paused_at.as_deref()
    }
}
