//! Individual Step Execution
//!
//! Runs exactly one step:
//! - `beforeStep` hooks (a pause request skips the step)
//! - Executor dispatch, bounded by the step timeout and retried per policy
//! - Post-conditions from the step's `after` flags
//! - Deferred tasks, then `afterStep` hooks
//!
//! Failures are reported as [`StepOutcome::Failed`] once retries are spent;
//! routing them is the caller's job.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info};

use super::context::ExecCtx;
use super::executor::{ExecutionOutcome, ExecutorRegistry};
use super::interfaces::TabController;
use super::retry::{RetryOperation, RetryPolicy};
use crate::config::EngineConfig;
use crate::error::FlowError;
use crate::flow::Step;
use crate::monitoring::{DiagnosticEvent, SinkPolicy};
use crate::plugins::PluginManager;

/// Result of running one step.
#[derive(Debug)]
pub enum StepOutcome {
    Succeeded(ExecutionOutcome),
    Failed(FlowError),
    /// A hook asked to pause; the step did not run
    Paused,
}

/// Shared collaborators for running steps of one run.
#[derive(Clone, Copy)]
pub struct StepRunner<'a> {
    pub executors: &'a ExecutorRegistry,
    pub plugins: &'a PluginManager,
    pub tab: Option<&'a dyn TabController>,
    pub config: &'a EngineConfig,
}

/// One step wrapped for the retry loop.
struct StepAttempt<'r, 'a> {
    runner: &'r StepRunner<'a>,
    ctx: &'r mut ExecCtx,
    step: &'r Step,
}

#[async_trait]
impl<'r, 'a> RetryOperation for StepAttempt<'r, 'a> {
    type Output = ExecutionOutcome;

    async fn attempt(&mut self, attempt: u32) -> Result<ExecutionOutcome, FlowError> {
        // The deadline is only enforced between attempts, never mid-attempt.
        if attempt > 1 {
            self.ctx.check_deadline()?;
        }

        let dispatch = self.runner.executors.execute(self.ctx, self.step);
        match self.step.timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), dispatch)
                .await
                .unwrap_or_else(|_| {
                    Err(FlowError::StepTimeout {
                        step_id: self.step.id.clone(),
                        timeout_ms,
                    })
                }),
            None => dispatch.await,
        }
    }

    async fn on_retry(&mut self, attempt: u32, error: &FlowError, delay: Duration) {
        self.ctx.logger.retrying(
            &self.step.id,
            format!(
                "Attempt {} failed: {}; retrying in {}ms",
                attempt,
                error,
                delay.as_millis()
            ),
        );
        self.runner
            .plugins
            .on_retry(self.ctx, self.step, attempt, error)
            .await;
    }
}

impl<'a> StepRunner<'a> {
    /// Runs a step with hooks, retries and post-conditions.
    pub async fn run(&self, ctx: &mut ExecCtx, step: &Step) -> StepOutcome {
        self.plugins.before_step(ctx, step).await;
        if ctx.pause_requested() {
            ctx.mark_paused(&step.id);
            ctx.logger.paused(&step.id, "Paused before step");
            ctx.logger.notify(
                DiagnosticEvent::Paused {
                    step_id: step.id.clone(),
                },
                SinkPolicy::RetryOnce,
            );
            return StepOutcome::Paused;
        }

        ctx.stats.total += 1;
        ctx.logger.notify(
            DiagnosticEvent::StepStarted {
                step_id: step.id.clone(),
            },
            SinkPolicy::Ignore,
        );
        debug!("Running step '{}' ({})", step.id, step.kind);

        let started = Instant::now();
        let policy = RetryPolicy::new(
            step.retry.clone(),
            Duration::from_millis(self.config.max_backoff_ms),
        );
        let result = {
            let mut attempt = StepAttempt {
                runner: self,
                ctx: &mut *ctx,
                step,
            };
            policy.run(&mut attempt).await
        };
        let took_ms = elapsed_ms(started);

        match result {
            Ok(outcome) => self.succeed(ctx, step, outcome, took_ms).await,
            Err(error) => self.fail(ctx, step, error, took_ms).await,
        }
    }

    async fn succeed(
        &self,
        ctx: &mut ExecCtx,
        step: &Step,
        mut outcome: ExecutionOutcome,
        took_ms: u64,
    ) -> StepOutcome {
        self.apply_post_conditions(ctx, step).await;

        if !outcome.already_logged {
            ctx.logger
                .success(&step.id, format!("{} completed", step.kind), took_ms);
        }

        for node in std::mem::take(&mut outcome.deferred) {
            let task = Step::from_node(&node, self.config);
            debug!("Running deferred task '{}' of '{}'", task.id, step.id);
            if let Err(e) = self.executors.execute(ctx, &task).await {
                ctx.logger
                    .warning(&step.id, format!("Deferred task '{}' failed: {}", task.id, e));
            }
        }

        ctx.stats.succeeded += 1;
        ctx.logger.notify(
            DiagnosticEvent::StepSucceeded {
                step_id: step.id.clone(),
                took_ms,
            },
            SinkPolicy::Ignore,
        );
        self.plugins.after_step(ctx, step).await;

        StepOutcome::Succeeded(outcome)
    }

    async fn fail(
        &self,
        ctx: &mut ExecCtx,
        step: &Step,
        error: FlowError,
        took_ms: u64,
    ) -> StepOutcome {
        let screenshot = if step.screenshot_on_fail || ctx.screenshot_on_fail {
            self.capture_failure(ctx, step).await
        } else {
            None
        };

        ctx.logger
            .failed(&step.id, error.to_string(), Some(took_ms), screenshot);
        ctx.stats.failed += 1;
        ctx.logger.notify(
            DiagnosticEvent::StepFailed {
                step_id: step.id.clone(),
                reason: error.to_string(),
            },
            SinkPolicy::RetryOnce,
        );
        self.plugins.on_error(ctx, step, &error).await;

        StepOutcome::Failed(error)
    }

    async fn capture_failure(&self, ctx: &mut ExecCtx, step: &Step) -> Option<String> {
        let tab = self.tab?;
        match tab.capture_screenshot().await {
            Ok(Some(reference)) => {
                info!("Captured failure screenshot for '{}'", step.id);
                ctx.failure_screenshots.push(reference.clone());
                Some(reference)
            }
            Ok(None) => None,
            Err(e) => {
                ctx.logger
                    .warning(&step.id, format!("Failure screenshot unavailable: {}", e));
                None
            }
        }
    }

    /// Waits requested by the step's `after` flags. Failures only warn.
    async fn apply_post_conditions(&self, ctx: &mut ExecCtx, step: &Step) {
        let after = step.after;
        if !after.wait_for_navigation && !after.wait_for_network_idle {
            return;
        }

        let Some(tab) = self.tab else {
            debug!("No tab controller; skipping post-conditions of '{}'", step.id);
            return;
        };

        let idle_timeout = Duration::from_millis(self.config.network_idle_timeout_ms);
        let idle_quiet = Duration::from_millis(self.config.network_idle_quiet_ms);
        let mut idle_done = false;

        if after.wait_for_navigation {
            let nav_timeout = Duration::from_millis(self.config.navigation_timeout_ms);
            if let Err(e) = tab.wait_for_navigation(nav_timeout).await {
                ctx.logger.warning(
                    &step.id,
                    format!("Navigation wait failed: {}; waiting for network idle instead", e),
                );
                if let Err(e) = tab.wait_for_network_idle(idle_timeout, idle_quiet).await {
                    ctx.logger
                        .warning(&step.id, format!("Network idle wait failed: {}", e));
                }
                idle_done = true;
            }

            if let Err(e) = tab.prime_page().await {
                debug!("Priming page after '{}' failed: {}", step.id, e);
            }
        }

        if after.wait_for_network_idle && !idle_done {
            if let Err(e) = tab.wait_for_network_idle(idle_timeout, idle_quiet).await {
                ctx.logger
                    .warning(&step.id, format!("Network idle wait failed: {}", e));
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
