//! Error Types
//!
//! Crate-wide error taxonomy. Graph problems are reported through
//! [`ValidationError`], which carries a stable machine code used as the
//! step id of the terminal log entry.

use thiserror::Error;

/// Structural problems detected before a flow is executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Flow has no nodes; a DAG is required")]
    EmptyFlow,

    #[error("Duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    #[error("Node has empty or whitespace-only ID")]
    EmptyNodeId,

    #[error("Node '{0}' has no type specified")]
    EmptyNodeType(String),

    #[error("Edge {from} -> {to} references unknown node '{missing}'")]
    InvalidEdge {
        from: String,
        to: String,
        missing: String,
    },

    #[error("Flow graph contains a cycle through node '{0}'")]
    Cycle(String),

    #[error("Active page '{url}' does not match any flow binding")]
    BindingMismatch { url: String },

    #[error("Subflow '{0}' is not defined")]
    UnknownSubflow(String),
}

impl ValidationError {
    /// Machine-readable code recorded as the step id of the failure entry.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyFlow => "dag-required",
            Self::Cycle(_) => "dag-cycle",
            Self::BindingMismatch { .. } => "binding-mismatch",
            Self::UnknownSubflow(_) => "subflow-missing",
            Self::DuplicateNodeId(_)
            | Self::EmptyNodeId
            | Self::EmptyNodeType(_)
            | Self::InvalidEdge { .. } => "dag-invalid",
        }
    }
}

/// Errors produced while loading, validating, or executing a flow.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Step '{step_id}' failed: {reason}")]
    StepFailed { step_id: String, reason: String },

    #[error("Step '{step_id}' timed out after {timeout_ms}ms")]
    StepTimeout { step_id: String, timeout_ms: u64 },

    #[error("Global deadline of {0}ms exceeded")]
    GlobalTimeout(u64),

    #[error("Iteration cap of {0} node dispatches reached")]
    IterationCap(usize),

    #[error("No executor registered for step type '{0}'")]
    UnsupportedStep(String),

    #[error("Invalid parameters for step '{step_id}': {reason}")]
    InvalidParams { step_id: String, reason: String },

    #[error("Control flow error: {0}")]
    Control(String),

    #[error("Plugin '{plugin}' failed in {hook}: {reason}")]
    Plugin {
        plugin: String,
        hook: &'static str,
        reason: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid run state transition for '{run_id}': {from} -> {to}")]
    InvalidTransition {
        run_id: String,
        from: String,
        to: String,
    },

    #[error("External collaborator error: {0}")]
    External(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FlowError {
    /// Builds a step failure from any displayable reason.
    pub fn step(step_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::StepFailed {
            step_id: step_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures that end the run regardless of `onError` edges.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::GlobalTimeout(_) | Self::IterationCap(_) | Self::Validation(_)
        )
    }

    /// Returns false for failures another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        !self.is_terminal()
            && !matches!(
                self,
                Self::UnsupportedStep(_) | Self::InvalidParams { .. } | Self::Control(_)
            )
    }

    /// Code recorded as the step id of a run-level failure entry.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::GlobalTimeout(_) => "global-timeout",
            Self::IterationCap(_) => "iteration-cap",
            Self::StepFailed { .. } | Self::StepTimeout { .. } => "step-failed",
            _ => "run-error",
        }
    }
}
