//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FlowError;
use crate::execution::context::ExecCtx;
use crate::execution::executor::{ExecutionOutcome, NodeExecutor};
use crate::execution::interfaces::{
    CaptureOptions, CaptureSummary, NetworkCapture, TabController, TabInfo, TabOptions,
};
use crate::flow::{Node, Step};
use crate::plugins::{HookContext, HookOutcome, Plugin};
use crate::runs::{RunPersistence, RunRecord};

/// Succeeds every time, remembering which steps ran.
#[derive(Default)]
pub struct CountingExecutor {
    order: Mutex<Vec<String>>,
    captured: Mutex<Vec<Value>>,
    capture_var: Option<String>,
    deferred: Option<Node>,
}

impl CountingExecutor {
    /// Also records the value of `var` at each call.
    pub fn capturing(mut self, var: &str) -> Self {
        self.capture_var = Some(var.to_string());
        self
    }

    /// Queues `node` as a deferred task on every call.
    pub fn deferring(mut self, node: Node) -> Self {
        self.deferred = Some(node);
        self
    }

    pub fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    pub fn calls_for(&self, step_id: &str) -> usize {
        self.order.lock().unwrap().iter().filter(|id| *id == step_id).count()
    }

    pub fn captured(&self) -> Vec<Value> {
        self.captured.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeExecutor for CountingExecutor {
    async fn execute(&self, ctx: &mut ExecCtx, step: &Step) -> Result<ExecutionOutcome, FlowError> {
        self.order.lock().unwrap().push(step.id.clone());
        if let Some(var) = &self.capture_var {
            let value = ctx.vars.get(var).cloned().unwrap_or(Value::Null);
            self.captured.lock().unwrap().push(value);
        }

        let mut outcome = ExecutionOutcome::new();
        if let Some(node) = &self.deferred {
            outcome = outcome.with_deferred(node.clone());
        }
        Ok(outcome)
    }
}

/// Fails the first `failures` calls, then succeeds.
pub struct FailingExecutor {
    failures: usize,
    calls: AtomicUsize,
}

impl FailingExecutor {
    pub fn always() -> Self {
        Self::times(usize::MAX)
    }

    pub fn times(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeExecutor for FailingExecutor {
    async fn execute(
        &self,
        _ctx: &mut ExecCtx,
        step: &Step,
    ) -> Result<ExecutionOutcome, FlowError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(FlowError::step(&step.id, format!("scripted failure #{}", call + 1)))
        } else {
            Ok(ExecutionOutcome::new())
        }
    }
}

/// Sleeps before succeeding.
pub struct SleepExecutor {
    duration: Duration,
}

impl SleepExecutor {
    pub fn new(ms: u64) -> Self {
        Self {
            duration: Duration::from_millis(ms),
        }
    }
}

#[async_trait]
impl NodeExecutor for SleepExecutor {
    async fn execute(
        &self,
        _ctx: &mut ExecCtx,
        _step: &Step,
    ) -> Result<ExecutionOutcome, FlowError> {
        tokio::time::sleep(self.duration).await;
        Ok(ExecutionOutcome::new())
    }
}

/// Records every hook call as `hook:detail`.
#[derive(Default)]
pub struct RecordingPlugin {
    hooks: Mutex<Vec<String>>,
    pause_before: Option<String>,
}

impl RecordingPlugin {
    pub fn pausing_before(step_id: &str) -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            pause_before: Some(step_id.to_string()),
        }
    }

    pub fn hooks(&self) -> Vec<String> {
        self.hooks.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.hooks.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        "recording"
    }

    async fn run_start(&self, _ctx: &HookContext<'_>) -> Result<HookOutcome, FlowError> {
        self.record("runStart".to_string());
        Ok(HookOutcome::proceed())
    }

    async fn before_step(
        &self,
        _ctx: &HookContext<'_>,
        step: &Step,
    ) -> Result<HookOutcome, FlowError> {
        self.record(format!("beforeStep:{}", step.id));
        if self.pause_before.as_deref() == Some(step.id.as_str()) {
            return Ok(HookOutcome::pause());
        }
        Ok(HookOutcome::proceed())
    }

    async fn after_step(
        &self,
        _ctx: &HookContext<'_>,
        step: &Step,
    ) -> Result<HookOutcome, FlowError> {
        self.record(format!("afterStep:{}", step.id));
        Ok(HookOutcome::proceed())
    }

    async fn on_retry(
        &self,
        _ctx: &HookContext<'_>,
        step: &Step,
        attempt: u32,
        _error: &FlowError,
    ) -> Result<HookOutcome, FlowError> {
        self.record(format!("onRetry:{}:{}", step.id, attempt));
        Ok(HookOutcome::proceed())
    }

    async fn on_error(
        &self,
        _ctx: &HookContext<'_>,
        step: &Step,
        _error: &FlowError,
    ) -> Result<HookOutcome, FlowError> {
        self.record(format!("onError:{}", step.id));
        Ok(HookOutcome::proceed())
    }

    async fn subflow_start(
        &self,
        _ctx: &HookContext<'_>,
        name: &str,
    ) -> Result<HookOutcome, FlowError> {
        self.record(format!("subflowStart:{}", name));
        Ok(HookOutcome::proceed())
    }

    async fn subflow_end(
        &self,
        _ctx: &HookContext<'_>,
        name: &str,
    ) -> Result<HookOutcome, FlowError> {
        self.record(format!("subflowEnd:{}", name));
        Ok(HookOutcome::proceed())
    }

    async fn run_end(
        &self,
        _ctx: &HookContext<'_>,
        success: bool,
    ) -> Result<HookOutcome, FlowError> {
        self.record(format!("runEnd:{}", success));
        Ok(HookOutcome::proceed())
    }
}

/// In-memory tab that remembers what it was asked to do.
pub struct FakeTab {
    url: Mutex<String>,
    fail_navigation: bool,
    ensure_calls: AtomicUsize,
    idle_waits: AtomicUsize,
    primed: AtomicUsize,
    screenshots: AtomicUsize,
}

impl FakeTab {
    pub fn new(url: &str) -> Self {
        Self {
            url: Mutex::new(url.to_string()),
            fail_navigation: false,
            ensure_calls: AtomicUsize::new(0),
            idle_waits: AtomicUsize::new(0),
            primed: AtomicUsize::new(0),
            screenshots: AtomicUsize::new(0),
        }
    }

    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn network_idle_waits(&self) -> usize {
        self.idle_waits.load(Ordering::SeqCst)
    }

    pub fn primed(&self) -> usize {
        self.primed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabController for FakeTab {
    async fn ensure_tab(&self, options: &TabOptions) -> Result<TabInfo, FlowError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        let mut url = self.url.lock().unwrap();
        if let Some(target) = &options.url {
            *url = target.clone();
        }
        Ok(TabInfo::new(url.clone()))
    }

    async fn active_tab(&self) -> Result<TabInfo, FlowError> {
        Ok(TabInfo {
            url: self.url.lock().unwrap().clone(),
            status: Some("complete".to_string()),
        })
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<(), FlowError> {
        if self.fail_navigation {
            return Err(FlowError::External("navigation never committed".to_string()));
        }
        Ok(())
    }

    async fn wait_for_network_idle(
        &self,
        _timeout: Duration,
        _quiet: Duration,
    ) -> Result<(), FlowError> {
        self.idle_waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn prime_page(&self) -> Result<(), FlowError> {
        self.primed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn capture_screenshot(&self) -> Result<Option<String>, FlowError> {
        let n = self.screenshots.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("screenshot-{}", n)))
    }
}

/// Network capture that reports a fixed number of requests.
#[derive(Default)]
pub struct FakeCapture {
    started: Mutex<Vec<CaptureOptions>>,
    stops: AtomicUsize,
}

impl FakeCapture {
    pub fn started(&self) -> Vec<CaptureOptions> {
        self.started.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkCapture for FakeCapture {
    async fn start(&self, options: &CaptureOptions) -> Result<(), FlowError> {
        self.started.lock().unwrap().push(options.clone());
        Ok(())
    }

    async fn stop(&self) -> Result<CaptureSummary, FlowError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(CaptureSummary {
            requests: 3,
            failed_requests: 1,
            notes: vec!["fake".to_string()],
        })
    }
}

/// Persistence that rejects every record.
pub struct FailingPersistence;

#[async_trait]
impl RunPersistence for FailingPersistence {
    async fn append_run(&self, _record: &RunRecord) -> Result<(), FlowError> {
        Err(FlowError::Persistence("disk full".to_string()))
    }
}
