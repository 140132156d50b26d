//! Flow Execution Engine
//!
//! The orchestrator that replays a flow from start to finish:
//! - Tab preparation, run registration and variable resolution
//! - Graph validation before any step runs
//! - Label-driven traversal with `onError` routing and control directives
//! - Cleanup that always persists the outcome and settles the run state

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use super::context::ExecCtx;
use super::control::{ControlFlowRunner, ControlOutcome};
use super::executor::ExecutorRegistry;
use super::interfaces::{
    CaptureOptions, CaptureSummary, NetworkCapture, TabController, TabOptions, VariableCollector,
};
use super::options::{RunFailure, RunOptions, RunResult, RunSummary, Screenshots};
use super::step::{StepOutcome, StepRunner};
use crate::config::EngineConfig;
use crate::error::{FlowError, ValidationError};
use crate::flow::variables::{check_rules, initial_variables, missing_required, public_outputs};
use crate::flow::{validate_flow, Flow, FlowGraph, Step, VariableDef, DEFAULT_LABEL};
use crate::monitoring::{DiagnosticEvent, OverlaySink, RunLogger, SinkPolicy};
use crate::plugins::{BreakpointPlugin, Plugin, PluginManager};
use crate::runs::{
    JsonlRunPersistence, RunPersistence, RunRecord, RunState, RunStateEntry, RunStatePatch,
    RunStatus,
};

/// How traversal ended when no run-level error occurred.
#[derive(Debug)]
enum RunEnd {
    Completed,
    Paused,
    /// A step failed with no `onError` edge to follow
    Failed(FlowError),
}

/// What setup managed to do, so cleanup only undoes that.
#[derive(Debug, Default)]
struct Session {
    registered: bool,
    capturing: bool,
}

/// Flow execution orchestrator.
///
/// Holds the services shared by every run. `run_flow` takes `&self`, so
/// one orchestrator can serve concurrent runs; each run owns its own
/// execution context and variable bag.
///
/// # Example
///
/// ```rust,no_run
/// use flowreplay::execution::{ExecutorRegistry, Orchestrator, RunOptions};
/// use flowreplay::{load_flow, EngineConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let flow = load_flow("checkout.yaml")?;
///     let orchestrator =
///         Orchestrator::from_config(ExecutorRegistry::new(), EngineConfig::default());
///
///     let result = orchestrator
///         .run_flow(&flow, RunOptions::new().with_timeout(60_000))
///         .await;
///     println!("success: {}", result.success);
///     Ok(())
/// }
/// ```
pub struct Orchestrator {
    executors: Arc<ExecutorRegistry>,
    run_state: Arc<RunState>,
    persistence: Arc<dyn RunPersistence>,
    tab: Option<Arc<dyn TabController>>,
    collector: Option<Arc<dyn VariableCollector>>,
    capture: Option<Arc<dyn NetworkCapture>>,
    overlay: Option<Arc<dyn OverlaySink>>,
    breakpoints: Arc<BreakpointPlugin>,
    plugins: Vec<Arc<dyn Plugin>>,
    config: EngineConfig,
}

impl Orchestrator {
    /// Creates an orchestrator with the breakpoint plugin as its only default plugin.
    pub fn new(
        executors: ExecutorRegistry,
        run_state: Arc<RunState>,
        persistence: Arc<dyn RunPersistence>,
    ) -> Self {
        let breakpoints = Arc::new(BreakpointPlugin::new());
        Self {
            executors: Arc::new(executors),
            run_state,
            persistence,
            tab: None,
            collector: None,
            capture: None,
            overlay: None,
            plugins: vec![breakpoints.clone()],
            breakpoints,
            config: EngineConfig::default(),
        }
    }

    /// Creates an orchestrator persisting under `config.state_dir`.
    pub fn from_config(executors: ExecutorRegistry, config: EngineConfig) -> Self {
        let run_state = Arc::new(RunState::file(config.run_state_path()));
        let persistence = Arc::new(JsonlRunPersistence::new(config.run_records_path()));
        let mut orchestrator = Self::new(executors, run_state, persistence);
        orchestrator.config = config;
        orchestrator
    }

    pub fn set_tab_controller(&mut self, tab: Arc<dyn TabController>) {
        self.tab = Some(tab);
    }

    pub fn set_variable_collector(&mut self, collector: Arc<dyn VariableCollector>) {
        self.collector = Some(collector);
    }

    pub fn set_network_capture(&mut self, capture: Arc<dyn NetworkCapture>) {
        self.capture = Some(capture);
    }

    pub fn set_overlay(&mut self, overlay: Arc<dyn OverlaySink>) {
        self.overlay = Some(overlay);
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Replaces the default plugin list used by runs that bring none.
    pub fn set_plugins(&mut self, plugins: Vec<Arc<dyn Plugin>>) {
        self.plugins = plugins;
    }

    /// The default breakpoint plugin.
    pub fn breakpoints(&self) -> &Arc<BreakpointPlugin> {
        &self.breakpoints
    }

    pub fn run_state(&self) -> &Arc<RunState> {
        &self.run_state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replays a flow.
    ///
    /// This is the main entry point that:
    /// 1. Prepares the tab, registers the run and resolves variables
    /// 2. Enforces URL bindings and starts the optional network capture
    /// 3. Validates the graph
    /// 4. Traverses nodes until the graph ends, a step fails unrecovered,
    ///    a plugin pauses the run, or the deadline passes
    /// 5. Cleans up, persisting the record unless the run paused
    ///
    /// Never returns an error: every failure is reported in the result.
    pub async fn run_flow(&self, flow: &Flow, options: RunOptions) -> RunResult {
        let started = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        let mut ctx = ExecCtx::new(&run_id, &flow.id, RunLogger::with_sink(self.overlay.clone()));
        ctx.screenshot_on_fail = options.screenshot_on_fail;
        ctx.set_timeout(options.timeout_ms);

        let plugins = PluginManager::new(
            options
                .plugins
                .clone()
                .unwrap_or_else(|| self.plugins.clone()),
        );
        let steps = StepRunner {
            executors: &self.executors,
            plugins: &plugins,
            tab: self.tab.as_deref(),
            config: &self.config,
        };

        info!(
            "Starting run {} of flow '{}' ({} nodes, {} plugins)",
            run_id,
            flow.id,
            flow.len(),
            plugins.len()
        );

        let mut session = Session::default();
        let end = match self.prepare(flow, &options, &plugins, &mut ctx, &mut session).await {
            Ok(()) => match validate_flow(flow) {
                Ok(()) => self.traverse(flow, &options, &steps, &mut ctx).await,
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };

        self.finish(flow, &options, &plugins, ctx, session, end, started, started_at)
            .await
    }

    async fn prepare(
        &self,
        flow: &Flow,
        options: &RunOptions,
        plugins: &PluginManager,
        ctx: &mut ExecCtx,
        session: &mut Session,
    ) -> Result<(), FlowError> {
        let start_url = options
            .start_url
            .clone()
            .or_else(|| flow.default_start_url());

        if let Some(tab) = &self.tab {
            let tab_options = TabOptions {
                url: start_url,
                refresh: options.refresh,
                target: options.tab_target,
            };
            match tab.ensure_tab(&tab_options).await {
                Ok(info) => debug!("Tab ready at {}", info.url),
                Err(e) => ctx
                    .logger
                    .warning(&flow.id, format!("Could not prepare tab: {}", e)),
            }
        }

        match self
            .run_state
            .add(&ctx.run_id, RunStateEntry::running(&flow.id, &flow.name))
            .await
        {
            Ok(()) => session.registered = true,
            Err(e) => ctx
                .logger
                .warning(&flow.id, format!("Could not register run: {}", e)),
        }

        plugins.run_start(ctx).await;
        self.resolve_variables(flow, options, ctx).await;
        self.check_bindings(flow, options, ctx).await?;

        if options.capture_network {
            match &self.capture {
                Some(capture) => {
                    let capture_options = CaptureOptions {
                        run_id: ctx.run_id.clone(),
                        flow_id: flow.id.clone(),
                    };
                    match capture.start(&capture_options).await {
                        Ok(()) => session.capturing = true,
                        Err(e) => ctx
                            .logger
                            .warning(&flow.id, format!("Network capture unavailable: {}", e)),
                    }
                }
                None => debug!("Network capture requested but no capture service is set"),
            }
        }

        Ok(())
    }

    /// Defaults, then arguments, then whatever the collector supplies.
    async fn resolve_variables(&self, flow: &Flow, options: &RunOptions, ctx: &mut ExecCtx) {
        ctx.vars = initial_variables(flow, &options.args);

        let missing: Vec<VariableDef> = missing_required(flow, &ctx.vars)
            .into_iter()
            .cloned()
            .collect();

        if !missing.is_empty() {
            match &self.collector {
                Some(collector) => match collector.collect(&missing, &ctx.vars).await {
                    Ok(values) => {
                        debug!("Collected {} variables", values.len());
                        ctx.vars.extend(values);
                    }
                    Err(e) => ctx
                        .logger
                        .warning(&flow.id, format!("Variable collection failed: {}", e)),
                },
                None => debug!("{} required variables have no value", missing.len()),
            }
        }

        for violation in check_rules(flow, &ctx.vars) {
            ctx.logger.warning(&flow.id, violation);
        }
    }

    /// Bindings apply only when the caller did not pick the start page.
    async fn check_bindings(
        &self,
        flow: &Flow,
        options: &RunOptions,
        ctx: &mut ExecCtx,
    ) -> Result<(), FlowError> {
        if options.start_url.is_some() || flow.meta.bindings.is_empty() {
            return Ok(());
        }

        let Some(tab) = &self.tab else {
            debug!("No tab controller; bindings of '{}' not checked", flow.id);
            return Ok(());
        };

        match tab.active_tab().await {
            Ok(info) if !flow.meta.allows(&info.url) => {
                Err(ValidationError::BindingMismatch { url: info.url }.into())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                ctx.logger
                    .warning(&flow.id, format!("Could not read active tab: {}", e));
                Ok(())
            }
        }
    }

    async fn traverse(
        &self,
        flow: &Flow,
        options: &RunOptions,
        steps: &StepRunner<'_>,
        ctx: &mut ExecCtx,
    ) -> Result<RunEnd, FlowError> {
        let graph = FlowGraph::new(&flow.nodes, &flow.edges);
        let control = ControlFlowRunner::new(steps, flow);

        let mut current = graph.start_node(options.start_node_id.as_deref());
        let mut dispatched = 0usize;

        while let Some(node) = current {
            dispatched += 1;
            if dispatched > self.config.max_iterations {
                return Err(FlowError::IterationCap(self.config.max_iterations));
            }
            ctx.check_deadline()?;

            let step = Step::from_node(node, &self.config);
            let result = match steps.run(ctx, &step).await {
                StepOutcome::Paused => return Ok(RunEnd::Paused),
                StepOutcome::Failed(e) => Err(e),
                StepOutcome::Succeeded(outcome) => match &outcome.control {
                    None => Ok(outcome),
                    Some(directive) => match control.run(ctx, &step.id, directive, 1).await {
                        Ok(ControlOutcome::Paused) => return Ok(RunEnd::Paused),
                        Ok(ControlOutcome::Completed) => Ok(outcome),
                        Err(e) if e.is_terminal() => return Err(e),
                        Err(e) => {
                            // The control step itself now counts as failed.
                            ctx.stats.succeeded = ctx.stats.succeeded.saturating_sub(1);
                            ctx.stats.failed += 1;
                            ctx.logger.failed(&step.id, e.to_string(), None, None);
                            steps.plugins.on_error(ctx, &step, &e).await;
                            Err(e)
                        }
                    },
                },
            };

            current = match result {
                Ok(outcome) => {
                    let label = outcome
                        .next_label
                        .unwrap_or_else(|| DEFAULT_LABEL.to_string());
                    let label = steps.plugins.choose_next_label(ctx, &step, label).await;

                    match graph.next_edge(&step.id, &label) {
                        Some(edge) => graph.node(&edge.to),
                        None => {
                            if graph.outgoing(&step.id).any(|e| !e.is_on_error()) {
                                ctx.logger.warning(
                                    &step.id,
                                    format!("No outgoing edge for label '{}'; ending run", label),
                                );
                            }
                            None
                        }
                    }
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => match graph.error_edge(&step.id) {
                    Some(edge) => {
                        info!("'{}' failed; following onError edge to '{}'", step.id, edge.to);
                        graph.node(&edge.to)
                    }
                    None => return Ok(RunEnd::Failed(e)),
                },
            };
        }

        Ok(RunEnd::Completed)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        flow: &Flow,
        options: &RunOptions,
        plugins: &PluginManager,
        mut ctx: ExecCtx,
        session: Session,
        end: Result<RunEnd, FlowError>,
        started: Instant,
        started_at: DateTime<Utc>,
    ) -> RunResult {
        let (success, paused, failure) = match end {
            Ok(RunEnd::Completed) => (true, false, None),
            Ok(RunEnd::Paused) => (false, true, None),
            Ok(RunEnd::Failed(e)) => (false, false, Some(RunFailure::from(&e))),
            Err(e) => {
                ctx.logger.failed(e.code(), e.to_string(), None, None);
                (false, false, Some(RunFailure::from(&e)))
            }
        };

        let network = if session.capturing {
            self.stop_capture(&flow.id, &mut ctx).await
        } else {
            None
        };

        plugins.run_end(&mut ctx, success).await;
        ctx.logger
            .notify(DiagnosticEvent::RunFinished { success }, SinkPolicy::RetryOnce);

        if !paused {
            let record = RunRecord {
                id: ctx.run_id.clone(),
                flow_id: flow.id.clone(),
                started_at,
                finished_at: Utc::now(),
                success,
                entries: ctx.logger.entries().to_vec(),
            };
            if let Err(e) = self.persistence.append_run(&record).await {
                ctx.logger
                    .warning(&flow.id, format!("Could not persist run record: {}", e));
            }
        }

        if session.registered {
            self.settle_run_state(&flow.id, &mut ctx, success, paused).await;
        }

        let took_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = RunSummary {
            total: ctx.stats.total,
            success: ctx.stats.succeeded,
            failed: ctx.stats.failed,
            took_ms,
        };

        match (&failure, paused) {
            (_, true) => info!(
                "Run {} paused before '{}'",
                ctx.run_id,
                ctx.paused_at().unwrap_or("?")
            ),
            (Some(f), _) => warn!("Run {} failed [{}]: {}", ctx.run_id, f.code, f.message),
            (None, _) => info!(
                "Run {} completed: {} steps in {}ms",
                ctx.run_id, summary.total, took_ms
            ),
        }

        let outputs = public_outputs(flow, &ctx.vars);
        let screenshots = Screenshots {
            on_failure: std::mem::take(&mut ctx.failure_screenshots),
        };
        let run_id = ctx.run_id.clone();
        let logs = options.return_logs.then(|| ctx.logger.into_entries());

        RunResult {
            run_id,
            success,
            summary,
            outputs,
            logs,
            screenshots,
            paused,
            network,
            failure,
        }
    }

    async fn stop_capture(&self, flow_id: &str, ctx: &mut ExecCtx) -> Option<CaptureSummary> {
        let capture = self.capture.as_ref()?;
        match capture.stop().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                ctx.logger
                    .warning(flow_id, format!("Network capture did not stop cleanly: {}", e));
                None
            }
        }
    }

    /// Paused runs stay registered as `stopped`; finished runs are removed.
    async fn settle_run_state(
        &self,
        flow_id: &str,
        ctx: &mut ExecCtx,
        success: bool,
        paused: bool,
    ) {
        let status = match (paused, success) {
            (true, _) => RunStatus::Stopped,
            (false, true) => RunStatus::Completed,
            (false, false) => RunStatus::Failed,
        };

        if let Err(e) = self
            .run_state
            .update(&ctx.run_id, RunStatePatch::status(status))
            .await
        {
            ctx.logger
                .warning(flow_id, format!("Could not update run state: {}", e));
        }

        if !paused {
            if let Err(e) = self.run_state.delete(&ctx.run_id).await {
                ctx.logger
                    .warning(flow_id, format!("Could not clear run state: {}", e));
            }
        }
    }
}
