//! Built-in Executors
//!
//! Node types the engine understands without an external executor.
//!
//! | type      | parameters                                   | effect                        |
//! |-----------|----------------------------------------------|-------------------------------|
//! | `foreach` | `list`, `item` (default `item`), `subflow`   | foreach directive             |
//! | `while`   | `condition`, `subflow`, `max_iterations`     | while directive               |
//! | `if`      | `condition`                                  | next label `true` / `false`   |
//! | `delay`   | `ms`                                         | sleeps                        |

use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use super::context::ExecCtx;
use super::executor::{ControlDirective, ExecutionOutcome, NodeExecutor};
use crate::error::FlowError;
use crate::flow::{Condition, Step};

/// Default name of the per-element variable of a `foreach`.
pub const DEFAULT_ITEM_VAR: &str = "item";

fn required_str<'s>(step: &'s Step, key: &str) -> Result<&'s str, FlowError> {
    step.param_str(key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| FlowError::InvalidParams {
            step_id: step.id.clone(),
            reason: format!("missing string parameter '{}'", key),
        })
}

fn condition(step: &Step) -> Result<Condition, FlowError> {
    match step.param_as::<Condition>("condition") {
        Some(Ok(condition)) => Ok(condition),
        Some(Err(e)) => Err(FlowError::InvalidParams {
            step_id: step.id.clone(),
            reason: format!("invalid condition: {}", e),
        }),
        None => Err(FlowError::InvalidParams {
            step_id: step.id.clone(),
            reason: "missing parameter 'condition'".to_string(),
        }),
    }
}

/// Emits a foreach directive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeachExecutor;

#[async_trait]
impl NodeExecutor for ForeachExecutor {
    async fn execute(
        &self,
        _ctx: &mut ExecCtx,
        step: &Step,
    ) -> Result<ExecutionOutcome, FlowError> {
        let directive = ControlDirective::Foreach {
            list_var: required_str(step, "list")?.to_string(),
            item_var: step
                .param_str("item")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_ITEM_VAR)
                .to_string(),
            subflow: required_str(step, "subflow")?.to_string(),
        };
        Ok(ExecutionOutcome::new().with_control(directive))
    }
}

/// Emits a while directive.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhileExecutor;

#[async_trait]
impl NodeExecutor for WhileExecutor {
    async fn execute(
        &self,
        _ctx: &mut ExecCtx,
        step: &Step,
    ) -> Result<ExecutionOutcome, FlowError> {
        let max_iterations = match step.param("max_iterations") {
            None => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| FlowError::InvalidParams {
                        step_id: step.id.clone(),
                        reason: "'max_iterations' must be a non-negative integer".to_string(),
                    })?,
            ),
        };

        let directive = ControlDirective::While {
            condition: condition(step)?,
            subflow: required_str(step, "subflow")?.to_string(),
            max_iterations,
        };
        Ok(ExecutionOutcome::new().with_control(directive))
    }
}

/// Branches on a condition through the `true` / `false` edge labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct IfExecutor;

#[async_trait]
impl NodeExecutor for IfExecutor {
    async fn execute(&self, ctx: &mut ExecCtx, step: &Step) -> Result<ExecutionOutcome, FlowError> {
        let holds = condition(step)?.evaluate(&ctx.vars);
        debug!("Condition of '{}' evaluated to {}", step.id, holds);
        Ok(ExecutionOutcome::new().with_label(if holds { "true" } else { "false" }))
    }
}

/// Sleeps for `ms` milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayExecutor;

#[async_trait]
impl NodeExecutor for DelayExecutor {
    async fn execute(
        &self,
        _ctx: &mut ExecCtx,
        step: &Step,
    ) -> Result<ExecutionOutcome, FlowError> {
        let ms = step.param_u64("ms").unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ExecutionOutcome::new())
    }
}
