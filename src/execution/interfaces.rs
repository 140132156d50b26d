//! Collaborator Interfaces
//!
//! Browser-facing services the engine drives but does not implement.
//! All of them are optional: a run without a tab controller skips tab
//! preparation and post-conditions, a run without a variable collector
//! relies on defaults and arguments only.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::flow::{VariableDef, Variables};

/// Which tab a run drives.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TabTarget {
    #[default]
    Current,
    New,
}

/// Request to make a tab ready for a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabOptions {
    /// Page to open; `None` keeps whatever is loaded
    pub url: Option<String>,
    /// Reload even when the tab already shows `url`
    pub refresh: bool,
    pub target: TabTarget,
}

/// Snapshot of a tab.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TabInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TabInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
        }
    }
}

/// Controls the browser tab a flow runs in.
///
/// The wait and capture methods default to no-ops so simple controllers
/// only implement tab preparation.
#[async_trait]
pub trait TabController: Send + Sync {
    async fn ensure_tab(&self, options: &TabOptions) -> Result<TabInfo, FlowError>;

    async fn active_tab(&self) -> Result<TabInfo, FlowError>;

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<(), FlowError> {
        Ok(())
    }

    async fn wait_for_network_idle(
        &self,
        _timeout: Duration,
        _quiet: Duration,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    /// Re-injects whatever the page needs after a navigation.
    async fn prime_page(&self) -> Result<(), FlowError> {
        Ok(())
    }

    /// Returns a reference to a stored screenshot, if one was taken.
    async fn capture_screenshot(&self) -> Result<Option<String>, FlowError> {
        Ok(None)
    }
}

/// Asks the user (or another source) for variables that have no value.
#[async_trait]
pub trait VariableCollector: Send + Sync {
    /// Returns values for some or all of `missing`.
    async fn collect(
        &self,
        missing: &[VariableDef],
        current: &Variables,
    ) -> Result<Variables, FlowError>;
}

/// Settings for a diagnostic network capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub run_id: String,
    pub flow_id: String,
}

/// Result of a network capture.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureSummary {
    pub requests: u64,
    pub failed_requests: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Records network traffic while a run executes.
#[async_trait]
pub trait NetworkCapture: Send + Sync {
    async fn start(&self, options: &CaptureOptions) -> Result<(), FlowError>;
    async fn stop(&self) -> Result<CaptureSummary, FlowError>;
}
