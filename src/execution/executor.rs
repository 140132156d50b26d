//! Node Executors
//!
//! Concrete step actions (click, fill, navigate, ...) live outside the
//! engine and are plugged in through [`NodeExecutor`], keyed by node type
//! in an [`ExecutorRegistry`]. The registry ships with the control-flow
//! built-ins `foreach`, `while`, `if` and `delay`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::builtin::{DelayExecutor, ForeachExecutor, IfExecutor, WhileExecutor};
use super::context::ExecCtx;
use crate::error::FlowError;
use crate::flow::{Condition, Node, Step};

/// Control-flow request returned by a step.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlDirective {
    /// Run `subflow` once per element of the list variable `list_var`,
    /// binding the element to `item_var`.
    Foreach {
        list_var: String,
        item_var: String,
        subflow: String,
    },
    /// Run `subflow` while `condition` holds, at most `max_iterations` times.
    While {
        condition: Condition,
        subflow: String,
        max_iterations: Option<u32>,
    },
}

impl ControlDirective {
    pub fn subflow(&self) -> &str {
        match self {
            Self::Foreach { subflow, .. } | Self::While { subflow, .. } => subflow,
        }
    }
}

/// What an executor reports back after a successful attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    /// The executor wrote its own log entry
    pub already_logged: bool,
    /// Post-step tasks, dispatched once after the step succeeds
    pub deferred: Vec<Node>,
    /// Label of the edge to follow; `default` when absent
    pub next_label: Option<String>,
    pub control: Option<ControlDirective>,
}

impl ExecutionOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.next_label = Some(label.into());
        self
    }

    pub fn with_control(mut self, directive: ControlDirective) -> Self {
        self.control = Some(directive);
        self
    }

    pub fn with_deferred(mut self, node: Node) -> Self {
        self.deferred.push(node);
        self
    }

    pub fn logged(mut self) -> Self {
        self.already_logged = true;
        self
    }
}

/// Performs the action behind one node type.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, ctx: &mut ExecCtx, step: &Step) -> Result<ExecutionOutcome, FlowError>;
}

/// Node type -> executor lookup.
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorRegistry {
    /// A registry holding the built-in control-flow executors.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("foreach", Arc::new(ForeachExecutor));
        registry.register("while", Arc::new(WhileExecutor));
        registry.register("if", Arc::new(IfExecutor));
        registry.register("delay", Arc::new(DelayExecutor));
        registry
    }

    /// A registry with no executors at all.
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registers an executor, returning the one it replaces.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        executor: Arc<dyn NodeExecutor>,
    ) -> Option<Arc<dyn NodeExecutor>> {
        let kind = kind.into();
        debug!("Registering executor for '{}'", kind);
        self.executors.insert(kind, executor)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, kind: impl Into<String>, executor: Arc<dyn NodeExecutor>) -> Self {
        self.register(kind, executor);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn NodeExecutor>> {
        self.executors.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.executors.contains_key(kind)
    }

    /// Registered node types, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Dispatches a step to the executor registered for its type.
    pub async fn execute(
        &self,
        ctx: &mut ExecCtx,
        step: &Step,
    ) -> Result<ExecutionOutcome, FlowError> {
        let executor = self
            .executors
            .get(&step.kind)
            .ok_or_else(|| FlowError::UnsupportedStep(step.kind.clone()))?;
        executor.execute(ctx, step).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::monitoring::RunLogger;

    struct Echo;

    #[async_trait]
    impl NodeExecutor for Echo {
        async fn execute(
            &self,
            ctx: &mut ExecCtx,
            step: &Step,
        ) -> Result<ExecutionOutcome, FlowError> {
            ctx.vars.insert("echo".into(), step.id.clone().into());
            Ok(ExecutionOutcome::new().with_label("done"))
        }
    }

    fn step(kind: &str) -> Step {
        Step::from_node(&Node::new("s1", kind), &EngineConfig::default())
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ExecutorRegistry::new();
        assert_eq!(registry.kinds(), vec!["delay", "foreach", "if", "while"]);
        assert!(ExecutorRegistry::empty().kinds().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let registry = ExecutorRegistry::new().with("echo", Arc::new(Echo));
        let mut ctx = ExecCtx::new("r", "f", RunLogger::new());

        let outcome = registry.execute(&mut ctx, &step("echo")).await.unwrap();
        assert_eq!(outcome.next_label.as_deref(), Some("done"));
        assert_eq!(ctx.vars["echo"], "s1");
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let registry = ExecutorRegistry::empty();
        let mut ctx = ExecCtx::new("r", "f", RunLogger::new());

        let result = registry.execute(&mut ctx, &step("teleport")).await;
        assert!(matches!(result, Err(FlowError::UnsupportedStep(kind)) if kind == "teleport"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ExecutorRegistry::new();
        assert!(registry.register("delay", Arc::new(Echo)).is_some());
        assert!(registry.register("echo", Arc::new(Echo)).is_none());
    }
}
