//! Run Bookkeeping Module
//!
//! - [`state`]: Registry of in-flight runs with restart recovery
//! - [`record`]: Persistence of finished runs

pub mod record;
pub mod state;

pub use record::{JsonlRunPersistence, MemoryRunPersistence, RunPersistence, RunRecord};
pub use state::{
    FileRunStateStore, MemoryRunStateStore, RunState, RunStateEntry, RunStatePatch, RunStateStore,
    RunStatus,
};
