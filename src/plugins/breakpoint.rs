//! Breakpoint Plugin
//!
//! Debugger-style pausing: a run pauses before any step whose id has a
//! breakpoint, or before the very next step once [`pause_next`] is armed.
//!
//! [`pause_next`]: BreakpointPlugin::pause_next

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::info;

use super::{HookContext, HookOutcome, Plugin};
use crate::error::FlowError;
use crate::flow::Step;

/// Pauses runs before selected steps.
#[derive(Debug, Default)]
pub struct BreakpointPlugin {
    breakpoints: Mutex<HashSet<String>>,
    pause_next: AtomicBool,
}

impl BreakpointPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_breakpoints<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let plugin = Self::new();
        plugin
            .lock()
            .extend(ids.into_iter().map(Into::into));
        plugin
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.breakpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_breakpoint(&self, step_id: impl Into<String>) {
        self.lock().insert(step_id.into());
    }

    pub fn remove_breakpoint(&self, step_id: &str) -> bool {
        self.lock().remove(step_id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn has_breakpoint(&self, step_id: &str) -> bool {
        self.lock().contains(step_id)
    }

    /// Pauses before the next step of any run using this plugin.
    pub fn pause_next(&self) {
        self.pause_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Plugin for BreakpointPlugin {
    fn name(&self) -> &str {
        "breakpoint"
    }

    async fn before_step(
        &self,
        ctx: &HookContext<'_>,
        step: &Step,
    ) -> Result<HookOutcome, FlowError> {
        let stepping = self.pause_next.swap(false, Ordering::SeqCst);
        if stepping || self.has_breakpoint(&step.id) {
            info!("Run {} hit a breakpoint before '{}'", ctx.run_id, step.id);
            return Ok(HookOutcome::pause());
        }
        Ok(HookOutcome::proceed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::execution::context::ExecCtx;
    use crate::flow::Node;
    use crate::monitoring::RunLogger;

    fn step(id: &str) -> Step {
        Step::from_node(&Node::new(id, "click"), &EngineConfig::default())
    }

    #[tokio::test]
    async fn test_breakpoint_by_id() {
        let plugin = BreakpointPlugin::with_breakpoints(["b"]);
        let ctx = ExecCtx::new("r", "f", RunLogger::new());
        let hook = HookContext::new(&ctx);

        assert!(!plugin.before_step(&hook, &step("a")).await.unwrap().pause);
        assert!(plugin.before_step(&hook, &step("b")).await.unwrap().pause);

        assert!(plugin.remove_breakpoint("b"));
        assert!(!plugin.before_step(&hook, &step("b")).await.unwrap().pause);
    }

    #[tokio::test]
    async fn test_pause_next_is_one_shot() {
        let plugin = BreakpointPlugin::new();
        let ctx = ExecCtx::new("r", "f", RunLogger::new());
        let hook = HookContext::new(&ctx);

        plugin.pause_next();
        assert!(plugin.before_step(&hook, &step("a")).await.unwrap().pause);
        assert!(!plugin.before_step(&hook, &step("a")).await.unwrap().pause);
    }
}
