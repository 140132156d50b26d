//! FlowReplay - Graph-Based Flow Replay Engine
//!
//! Replays recorded browser automation flows. A flow is a directed graph of
//! typed nodes joined by labeled edges; the engine walks it one step at a
//! time, retrying failed steps, routing unrecovered failures along
//! `onError` edges, and expanding `foreach`/`while` nodes into subflows.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`flow`]: Flow model, loading, validation, expressions and variables
//! - [`execution`]: The orchestrator, step runner, retries and control flow
//! - [`plugins`]: Lifecycle hooks and the breakpoint plugin
//! - [`runs`]: Run state registry and persisted run records
//! - [`monitoring`]: Per-run log and diagnostic events
//! - [`config`]: Engine-wide settings
//!
//! # Example
//!
//! ```rust,no_run
//! use flowreplay::execution::{ExecutorRegistry, RunOptions};
//! use flowreplay::{init_logging, load_flow, EngineConfig, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging(false)?;
//!
//!     // Load a recorded flow
//!     let flow = load_flow("flows/search.yaml")?;
//!
//!     // Register executors for the flow's step types, then run it
//!     let orchestrator =
//!         Orchestrator::from_config(ExecutorRegistry::new(), EngineConfig::default());
//!     let result = orchestrator
//!         .run_flow(&flow, RunOptions::new().with_arg("query", "rust".into()))
//!         .await;
//!
//!     println!("{} ({} steps)", result.success, result.summary.total);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod flow;
pub mod logging;
pub mod monitoring;
pub mod plugins;
pub mod runs;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{FlowError, ValidationError};
pub use execution::{Orchestrator, RunOptions, RunResult};
pub use flow::{load_flow, save_flow, Flow};
pub use logging::init_logging;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "flowreplay";
