//! Flow Execution Module
//!
//! Runs flows step by step on the tokio runtime, with retries, control
//! flow, subflows and plugin hooks.
//!
//! # Architecture
//!
//! - [`engine`]: The [`Orchestrator`] driving a whole run
//! - [`step`]: Execution of a single step with hooks and retries
//! - [`control`] / [`subflow`]: `foreach` and `while` expansion into subflows
//! - [`executor`] / [`builtin`]: Node executor registry and built-in node types
//! - [`retry`]: Retry policy with backoff
//! - [`context`]: Per-run mutable state
//! - [`interfaces`]: Browser-facing collaborators the engine drives
//! - [`options`]: Run options and results

pub mod builtin;
pub mod context;
pub mod control;
pub mod engine;
pub mod executor;
pub mod interfaces;
pub mod options;
pub mod retry;
pub mod step;
pub mod subflow;

pub use context::{ExecCtx, StepStats};
pub use engine::Orchestrator;
pub use executor::{ControlDirective, ExecutionOutcome, ExecutorRegistry, NodeExecutor};
pub use interfaces::{
    CaptureOptions, CaptureSummary, NetworkCapture, TabController, TabInfo, TabOptions, TabTarget,
    VariableCollector,
};
pub use options::{RunFailure, RunOptions, RunResult, RunSummary, Screenshots};
pub use retry::{Backoff, RetryConfig, RetryPolicy};
