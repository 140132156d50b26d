//! Plugin Hooks
//!
//! Plugins observe a run through lifecycle hooks and may ask it to pause.
//! The [`PluginManager`] calls every plugin in registration order; a pause
//! request from any hook is honored at the next `beforeStep` check point.
//! Hook errors are recorded as warnings and never abort a run.
//!
//! | hook                 | fired                                   |
//! |----------------------|-----------------------------------------|
//! | `runStart`           | after the run is registered             |
//! | `beforeStep`         | before each step executes               |
//! | `afterStep`          | after a step and its deferred tasks     |
//! | `onRetry`            | between failed attempts                 |
//! | `onError`            | after a step exhausts its retries       |
//! | `onChooseNextLabel`  | before following an outgoing edge       |
//! | `subflowStart/End`   | around each subflow invocation          |
//! | `runEnd`             | during cleanup                          |

pub mod breakpoint;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FlowError;
use crate::execution::context::ExecCtx;
use crate::flow::{Step, Variables};

pub use breakpoint::BreakpointPlugin;

/// Read-only view of the run handed to hooks.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub run_id: &'a str,
    pub flow_id: &'a str,
    pub vars: &'a Variables,
}

impl<'a> HookContext<'a> {
    pub fn new(ctx: &'a ExecCtx) -> Self {
        Self {
            run_id: &ctx.run_id,
            flow_id: &ctx.flow_id,
            vars: &ctx.vars,
        }
    }
}

/// What a hook asks of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookOutcome {
    pub pause: bool,
}

impl HookOutcome {
    pub fn proceed() -> Self {
        Self { pause: false }
    }

    pub fn pause() -> Self {
        Self { pause: true }
    }
}

/// A run observer. Every hook defaults to doing nothing.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn run_start(&self, _ctx: &HookContext<'_>) -> Result<HookOutcome, FlowError> {
        Ok(HookOutcome::proceed())
    }

    async fn before_step(
        &self,
        _ctx: &HookContext<'_>,
        _step: &Step,
    ) -> Result<HookOutcome, FlowError> {
        Ok(HookOutcome::proceed())
    }

    async fn after_step(
        &self,
        _ctx: &HookContext<'_>,
        _step: &Step,
    ) -> Result<HookOutcome, FlowError> {
        Ok(HookOutcome::proceed())
    }

    async fn on_retry(
        &self,
        _ctx: &HookContext<'_>,
        _step: &Step,
        _attempt: u32,
        _error: &FlowError,
    ) -> Result<HookOutcome, FlowError> {
        Ok(HookOutcome::proceed())
    }

    async fn on_error(
        &self,
        _ctx: &HookContext<'_>,
        _step: &Step,
        _error: &FlowError,
    ) -> Result<HookOutcome, FlowError> {
        Ok(HookOutcome::proceed())
    }

    /// Returns a replacement for `label`, or `None` to keep it.
    async fn on_choose_next_label(
        &self,
        _ctx: &HookContext<'_>,
        _step: &Step,
        _label: &str,
    ) -> Result<Option<String>, FlowError> {
        Ok(None)
    }

    async fn subflow_start(
        &self,
        _ctx: &HookContext<'_>,
        _name: &str,
    ) -> Result<HookOutcome, FlowError> {
        Ok(HookOutcome::proceed())
    }

    async fn subflow_end(
        &self,
        _ctx: &HookContext<'_>,
        _name: &str,
    ) -> Result<HookOutcome, FlowError> {
        Ok(HookOutcome::proceed())
    }

    async fn run_end(
        &self,
        _ctx: &HookContext<'_>,
        _success: bool,
    ) -> Result<HookOutcome, FlowError> {
        Ok(HookOutcome::proceed())
    }
}

type HookResults = Vec<(String, Result<HookOutcome, FlowError>)>;

/// Calls `$call` on every plugin with a fresh hook context, then settles
/// the results against the run.
macro_rules! fan_out {
    ($self:ident, $ctx:ident, $hook:literal, $source:expr, |$plugin:ident, $hook_ctx:ident| $call:expr) => {{
        let mut results: HookResults = Vec::with_capacity($self.plugins.len());
        {
            let $hook_ctx = HookContext::new(&*$ctx);
            for $plugin in &$self.plugins {
                results.push(($plugin.name().to_string(), $call.await));
            }
        }
        Self::settle($ctx, $hook, $source, results);
    }};
}

/// Ordered list of plugins for one run.
#[derive(Clone, Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        f.debug_struct("PluginManager").field("plugins", &names).finish()
    }
}

impl PluginManager {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Applies pause requests and records hook failures as warnings.
    fn settle(ctx: &mut ExecCtx, hook: &'static str, source: &str, results: HookResults) {
        for (plugin, result) in results {
            match result {
                Ok(outcome) if outcome.pause => ctx.request_pause(),
                Ok(_) => {}
                Err(e) => {
                    let error = FlowError::Plugin {
                        plugin,
                        hook,
                        reason: e.to_string(),
                    };
                    ctx.logger.warning(source, error.to_string());
                }
            }
        }
    }

    pub async fn run_start(&self, ctx: &mut ExecCtx) {
        let source = ctx.flow_id.clone();
        fan_out!(self, ctx, "runStart", &source, |plugin, hook| plugin.run_start(&hook));
    }

    pub async fn before_step(&self, ctx: &mut ExecCtx, step: &Step) {
        fan_out!(self, ctx, "beforeStep", &step.id, |plugin, hook| plugin
            .before_step(&hook, step));
    }

    pub async fn after_step(&self, ctx: &mut ExecCtx, step: &Step) {
        fan_out!(self, ctx, "afterStep", &step.id, |plugin, hook| plugin
            .after_step(&hook, step));
    }

    pub async fn on_retry(&self, ctx: &mut ExecCtx, step: &Step, attempt: u32, error: &FlowError) {
        fan_out!(self, ctx, "onRetry", &step.id, |plugin, hook| plugin
            .on_retry(&hook, step, attempt, error));
    }

    pub async fn on_error(&self, ctx: &mut ExecCtx, step: &Step, error: &FlowError) {
        fan_out!(self, ctx, "onError", &step.id, |plugin, hook| plugin
            .on_error(&hook, step, error));
    }

    pub async fn subflow_start(&self, ctx: &mut ExecCtx, name: &str) {
        fan_out!(self, ctx, "subflowStart", name, |plugin, hook| plugin
            .subflow_start(&hook, name));
    }

    pub async fn subflow_end(&self, ctx: &mut ExecCtx, name: &str) {
        fan_out!(self, ctx, "subflowEnd", name, |plugin, hook| plugin
            .subflow_end(&hook, name));
    }

    pub async fn run_end(&self, ctx: &mut ExecCtx, success: bool) {
        let source = ctx.flow_id.clone();
        fan_out!(self, ctx, "runEnd", &source, |plugin, hook| plugin
            .run_end(&hook, success));
    }

    /// Lets each plugin in turn replace the label; the last override wins.
    pub async fn choose_next_label(&self, ctx: &mut ExecCtx, step: &Step, label: String) -> String {
        let mut label = label;
        let mut failures = Vec::new();

        {
            let hook = HookContext::new(&*ctx);
            for plugin in &self.plugins {
                match plugin.on_choose_next_label(&hook, step, &label).await {
                    Ok(Some(replacement)) => label = replacement,
                    Ok(None) => {}
                    Err(e) => failures.push((plugin.name().to_string(), Err(e))),
                }
            }
        }

        Self::settle(ctx, "onChooseNextLabel", &step.id, failures);
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::flow::Node;
    use crate::monitoring::{LogStatus, RunLogger};

    struct Faulty;

    #[async_trait]
    impl Plugin for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        async fn before_step(
            &self,
            _ctx: &HookContext<'_>,
            _step: &Step,
        ) -> Result<HookOutcome, FlowError> {
            Err(FlowError::External("boom".into()))
        }

        async fn on_choose_next_label(
            &self,
            _ctx: &HookContext<'_>,
            _step: &Step,
            label: &str,
        ) -> Result<Option<String>, FlowError> {
            Ok(Some(format!("{}-faulty", label)))
        }
    }

    struct Relabel(&'static str);

    #[async_trait]
    impl Plugin for Relabel {
        fn name(&self) -> &str {
            "relabel"
        }

        async fn on_choose_next_label(
            &self,
            _ctx: &HookContext<'_>,
            _step: &Step,
            _label: &str,
        ) -> Result<Option<String>, FlowError> {
            Ok(Some(self.0.to_string()))
        }

        async fn after_step(
            &self,
            _ctx: &HookContext<'_>,
            _step: &Step,
        ) -> Result<HookOutcome, FlowError> {
            Ok(HookOutcome::pause())
        }
    }

    fn step() -> Step {
        Step::from_node(&Node::new("s", "click"), &EngineConfig::default())
    }

    #[tokio::test]
    async fn test_hook_errors_become_warnings() {
        let manager = PluginManager::new(vec![Arc::new(Faulty)]);
        let mut ctx = ExecCtx::new("r", "f", RunLogger::new());

        manager.before_step(&mut ctx, &step()).await;

        let entries = ctx.logger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LogStatus::Warning);
        assert!(entries[0].message.contains("faulty"));
        assert!(entries[0].message.contains("beforeStep"));
        assert!(!ctx.pause_requested());
    }

    #[tokio::test]
    async fn test_pause_request_sets_flag() {
        let manager = PluginManager::new(vec![Arc::new(Relabel("x"))]);
        let mut ctx = ExecCtx::new("r", "f", RunLogger::new());

        manager.after_step(&mut ctx, &step()).await;
        assert!(ctx.pause_requested());
    }

    #[tokio::test]
    async fn test_label_override_chain() {
        let manager = PluginManager::new(vec![Arc::new(Relabel("yes")), Arc::new(Faulty)]);
        let mut ctx = ExecCtx::new("r", "f", RunLogger::new());

        let label = manager
            .choose_next_label(&mut ctx, &step(), "default".to_string())
            .await;
        assert_eq!(label, "yes-faulty");
    }

    #[tokio::test]
    async fn test_empty_manager() {
        let manager = PluginManager::default();
        let mut ctx = ExecCtx::new("r", "f", RunLogger::new());

        manager.run_start(&mut ctx).await;
        let label = manager
            .choose_next_label(&mut ctx, &step(), "default".into())
            .await;
        assert_eq!(label, "default");
        assert!(ctx.logger.is_empty());
    }
}
