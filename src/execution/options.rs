//! Run Options and Results
//!
//! Per-run input to [`Orchestrator::run_flow`](super::Orchestrator::run_flow)
//! and the structured result it always returns.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::interfaces::{CaptureSummary, TabTarget};
use crate::error::FlowError;
use crate::flow::Variables;
use crate::monitoring::RunLogEntry;
use crate::plugins::Plugin;

/// Options for a single run.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Drive the current tab or open a new one
    pub tab_target: TabTarget,
    /// Reload the start page even if it is already open
    pub refresh: bool,
    /// Record network traffic while the run executes
    pub capture_network: bool,
    /// Global deadline for the whole run
    pub timeout_ms: Option<u64>,
    /// Page to start on; when set, URL bindings are not enforced
    pub start_url: Option<String>,
    /// Caller-supplied variable values
    pub args: Variables,
    /// Node to start from instead of the graph's root
    pub start_node_id: Option<String>,
    /// Replaces the orchestrator's default plugins for this run
    pub plugins: Option<Vec<Arc<dyn Plugin>>>,
    /// Include the run log in the result
    pub return_logs: bool,
    /// Capture a screenshot whenever a step fails
    pub screenshot_on_fail: bool,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("tab_target", &self.tab_target)
            .field("refresh", &self.refresh)
            .field("capture_network", &self.capture_network)
            .field("timeout_ms", &self.timeout_ms)
            .field("start_url", &self.start_url)
            .field("args", &self.args.keys().collect::<Vec<_>>())
            .field("start_node_id", &self.start_node_id)
            .field("plugins", &self.plugins.as_ref().map(Vec::len))
            .field("return_logs", &self.return_logs)
            .field("screenshot_on_fail", &self.screenshot_on_fail)
            .finish()
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tab_target(mut self, target: TabTarget) -> Self {
        self.tab_target = target;
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_network_capture(mut self, capture: bool) -> Self {
        self.capture_network = capture;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_start_url(mut self, url: impl Into<String>) -> Self {
        self.start_url = Some(url.into());
        self
    }

    /// Sets one caller-supplied variable.
    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    pub fn with_args(mut self, args: Variables) -> Self {
        self.args = args;
        self
    }

    pub fn with_start_node(mut self, node_id: impl Into<String>) -> Self {
        self.start_node_id = Some(node_id.into());
        self
    }

    pub fn with_plugins(mut self, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn with_logs(mut self) -> Self {
        self.return_logs = true;
        self
    }

    pub fn with_screenshot_on_fail(mut self) -> Self {
        self.screenshot_on_fail = true;
        self
    }
}

/// Step counters and wall time of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub took_ms: u64,
}

/// Screenshots captured during a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Screenshots {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<String>,
}

/// Why a run ended unsuccessfully at the run level.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    /// Stable code such as `dag-cycle` or `global-timeout`
    pub code: String,
    pub message: String,
}

impl From<&FlowError> for RunFailure {
    fn from(error: &FlowError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of [`Orchestrator::run_flow`](super::Orchestrator::run_flow).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: String,
    pub success: bool,
    pub summary: RunSummary,
    /// Final variables with sensitive keys removed
    pub outputs: Variables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<RunLogEntry>>,
    pub screenshots: Screenshots,
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<CaptureSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl RunResult {
    /// Failure code, if the run failed at the run level.
    pub fn failure_code(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.code.as_str())
    }
}
