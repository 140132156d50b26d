//! Control Flow
//!
//! Expands `foreach` and `while` directives into repeated subflow
//! invocations. Iterations share the run's variable bag, so values written
//! by one iteration are visible to the next and to the parent graph.

use log::{debug, info};

use super::context::ExecCtx;
use super::executor::ControlDirective;
use super::step::StepRunner;
use super::subflow::SubflowRunner;
use crate::error::{FlowError, ValidationError};
use crate::flow::Flow;

/// How a control directive ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Completed,
    /// A step inside the subflow paused the run
    Paused,
}

/// Runs control directives against the subflows of one flow.
#[derive(Clone, Copy)]
pub struct ControlFlowRunner<'a> {
    steps: &'a StepRunner<'a>,
    flow: &'a Flow,
}

impl<'a> ControlFlowRunner<'a> {
    pub fn new(steps: &'a StepRunner<'a>, flow: &'a Flow) -> Self {
        Self { steps, flow }
    }

    /// Executes `directive`, emitted by `step_id`, at nesting `depth`.
    ///
    /// Depth 1 is a directive from the top-level graph.
    pub async fn run(
        &self,
        ctx: &mut ExecCtx,
        step_id: &str,
        directive: &ControlDirective,
        depth: usize,
    ) -> Result<ControlOutcome, FlowError> {
        let max_depth = self.steps.config.max_subflow_depth;
        if depth > max_depth {
            return Err(FlowError::Control(format!(
                "'{}' exceeds the subflow nesting limit of {}",
                step_id, max_depth
            )));
        }

        let name = directive.subflow();
        if !self.flow.subflows.contains_key(name) {
            return Err(ValidationError::UnknownSubflow(name.to_string()).into());
        }

        let subflows = SubflowRunner::new(self.steps, self.flow);

        match directive {
            ControlDirective::Foreach {
                list_var,
                item_var,
                subflow,
            } => {
                let items = match ctx.vars.get(list_var) {
                    Some(serde_json::Value::Array(items)) => items.clone(),
                    Some(other) => {
                        return Err(FlowError::Control(format!(
                            "'{}' expects '{}' to be a list, found {}",
                            step_id,
                            list_var,
                            type_name(other)
                        )))
                    }
                    None => {
                        return Err(FlowError::Control(format!(
                            "'{}' expects list variable '{}', which is not set",
                            step_id, list_var
                        )))
                    }
                };

                info!(
                    "'{}': running subflow '{}' for {} items",
                    step_id,
                    subflow,
                    items.len()
                );

                for (index, item) in items.into_iter().enumerate() {
                    debug!("'{}' iteration {}", step_id, index);
                    ctx.vars.insert(item_var.clone(), item);
                    if subflows.run(ctx, subflow, depth).await? == ControlOutcome::Paused {
                        return Ok(ControlOutcome::Paused);
                    }
                }
            }

            ControlDirective::While {
                condition,
                subflow,
                max_iterations,
            } => {
                let limit = max_iterations.unwrap_or(self.steps.config.default_while_iterations);
                let compiled = condition.compile();
                let mut iterations = 0;

                while iterations < limit && compiled.evaluate(&ctx.vars) {
                    debug!("'{}' iteration {}", step_id, iterations);
                    if subflows.run(ctx, subflow, depth).await? == ControlOutcome::Paused {
                        return Ok(ControlOutcome::Paused);
                    }
                    iterations += 1;
                }

                if iterations == limit && limit > 0 && compiled.evaluate(&ctx.vars) {
                    ctx.logger.warning(
                        step_id,
                        format!("Loop stopped after reaching {} iterations", limit),
                    );
                } else {
                    info!("'{}': loop finished after {} iterations", step_id, iterations);
                }
            }
        }

        Ok(ControlOutcome::Completed)
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}
