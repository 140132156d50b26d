//! Subflow Execution
//!
//! A subflow is a named node/edge graph run sequentially in topological
//! order of its non-`onError` edges. Labels are not consulted; a failing
//! step fails the whole invocation. Pauses propagate to the caller.

use async_recursion::async_recursion;
use log::debug;

use super::context::ExecCtx;
use super::control::{ControlFlowRunner, ControlOutcome};
use super::step::{StepOutcome, StepRunner};
use crate::error::{FlowError, ValidationError};
use crate::flow::{Flow, FlowGraph, Step};

/// Runs the subflows of one flow.
#[derive(Clone, Copy)]
pub struct SubflowRunner<'a> {
    steps: &'a StepRunner<'a>,
    flow: &'a Flow,
}

impl<'a> SubflowRunner<'a> {
    pub fn new(steps: &'a StepRunner<'a>, flow: &'a Flow) -> Self {
        Self { steps, flow }
    }

    /// Invokes subflow `name` once at nesting `depth`.
    #[async_recursion]
    pub async fn run(
        &self,
        ctx: &mut ExecCtx,
        name: &str,
        depth: usize,
    ) -> Result<ControlOutcome, FlowError> {
        let subflow = self
            .flow
            .subflows
            .get(name)
            .ok_or_else(|| ValidationError::UnknownSubflow(name.to_string()))?;

        let graph = FlowGraph::new(&subflow.nodes, &subflow.edges);
        let order = graph.topological_order()?;

        self.steps.plugins.subflow_start(ctx, name).await;
        debug!("Subflow '{}' (depth {}): {} nodes", name, depth, order.len());

        for node in order {
            ctx.check_deadline()?;

            let step = Step::from_node(node, self.steps.config);
            match self.steps.run(ctx, &step).await {
                StepOutcome::Paused => return Ok(ControlOutcome::Paused),
                StepOutcome::Failed(e) => return Err(e),
                StepOutcome::Succeeded(outcome) => {
                    if let Some(directive) = &outcome.control {
                        let control = ControlFlowRunner::new(self.steps, self.flow);
                        if control.run(ctx, &step.id, directive, depth + 1).await?
                            == ControlOutcome::Paused
                        {
                            return Ok(ControlOutcome::Paused);
                        }
                    }
                }
            }
        }

        self.steps.plugins.subflow_end(ctx, name).await;
        Ok(ControlOutcome::Completed)
    }
}
