//! Run Monitoring Module
//!
//! Provides the per-run log and diagnostic event plumbing.
//!
//! # Components
//!
//! - [`RunLogger`]: Ordered step outcomes, mirrored to the `log` facade
//! - [`OverlaySink`]: Best-effort receiver of typed [`DiagnosticEvent`]s

pub mod logger;

pub use logger::{DiagnosticEvent, LogStatus, OverlaySink, RunLogEntry, RunLogger, SinkPolicy};
