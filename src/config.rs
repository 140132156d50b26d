//! Engine Configuration
//!
//! Tunables shared by every run an [`Orchestrator`](crate::Orchestrator)
//! executes. All fields have defaults, so a YAML file only needs to list
//! the values it overrides:
//!
//! ```yaml
//! max_iterations: 5000
//! navigation_timeout_ms: 20000
//! default_retry:
//!   count: 2
//!   interval_ms: 500
//!   backoff: exponential
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::execution::retry::RetryConfig;

/// Hard cap on node dispatches per run.
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Maximum nesting of subflows started by control directives.
pub const DEFAULT_MAX_SUBFLOW_DEPTH: usize = 16;

/// Default directory for run state and run records.
pub const DEFAULT_STATE_DIR: &str = ".flowreplay";

/// Engine-wide settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum node dispatches before a run is aborted
    pub max_iterations: usize,

    /// Maximum subflow nesting depth
    pub max_subflow_depth: usize,

    /// Retry policy for nodes that declare none
    pub default_retry: RetryConfig,

    /// Per-attempt timeout for nodes that declare none
    pub default_step_timeout_ms: Option<u64>,

    /// How long to wait for a navigation requested by a step's `after` flags
    pub navigation_timeout_ms: u64,

    /// How long to wait for the network to settle
    pub network_idle_timeout_ms: u64,

    /// Quiet window that counts as network idle
    pub network_idle_quiet_ms: u64,

    /// Upper bound for a single retry backoff delay
    pub max_backoff_ms: u64,

    /// Iteration cap for `while` nodes that omit `max_iterations`
    pub default_while_iterations: u32,

    /// Directory holding `run_state.json` and `runs.jsonl`
    pub state_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_subflow_depth: DEFAULT_MAX_SUBFLOW_DEPTH,
            default_retry: RetryConfig::default(),
            default_step_timeout_ms: None,
            navigation_timeout_ms: 15_000,
            network_idle_timeout_ms: 5_000,
            network_idle_quiet_ms: 500,
            max_backoff_ms: 30_000,
            default_while_iterations: 100,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        debug!("Config content loaded ({} bytes)", content.len());

        let config: EngineConfig = serde_yaml::from_str(&content)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Path of the run state snapshot.
    pub fn run_state_path(&self) -> PathBuf {
        self.state_dir.join("run_state.json")
    }

    /// Path of the run record log.
    pub fn run_records_path(&self) -> PathBuf {
        self.state_dir.join("runs.jsonl")
    }
}
