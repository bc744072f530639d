// Hook manager: phased, prioritized, dependency-ordered callback execution
use crate::config::HookManagerConfig;
use crate::error::{DependencyError, HookCallbackError, HookwireError, Result};
use crate::events::breaker::RetryPolicy;
use crate::events::{Event, EventBus, EventType, HookType, Payload};
use crate::hooks::callback::{ErrorStrategy, HookCallback, HookContext, HookOptions, HookPhase};
use crate::hooks::dependency::DependencyGraph;
use crate::hooks::report::{
    CallbackOutcome, CallbackStatus, ExecutionReport, HookStats, PhaseError,
};
use crate::logging::utils::{hook_execution_span, log_callback_outcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

struct CallbackEntry {
    hook_type: HookType,
    callback: Arc<dyn HookCallback>,
    options: HookOptions,
    registration: u64,
    execution_count: u32,
    last_executed: Option<DateTime<Utc>>,
}

/// Snapshot of one callback taken when its phase is planned
struct PlannedCallback {
    id: String,
    callback: Arc<dyn HookCallback>,
    options: HookOptions,
}

#[derive(Default)]
struct ManagerState {
    callbacks: HashMap<String, CallbackEntry>,
    by_hook: HashMap<HookType, Vec<String>>,
    graph: DependencyGraph,
    stats: HookStats,
}

impl ManagerState {
    fn remove(&mut self, callback_id: &str) -> bool {
        let Some(entry) = self.callbacks.remove(callback_id) else {
            return false;
        };
        if let Some(ids) = self.by_hook.get_mut(&entry.hook_type) {
            ids.retain(|id| id != callback_id);
            if ids.is_empty() {
                self.by_hook.remove(&entry.hook_type);
            }
        }
        self.graph.remove(callback_id);
        true
    }
}

enum CallbackRun {
    Completed(CallbackOutcome),
    /// `Throw` strategy: the pass stops here
    Aborted(CallbackOutcome, HookwireError),
}

struct ManagerInner {
    config: HookManagerConfig,
    bus: Option<EventBus>,
    state: Mutex<ManagerState>,
    next_registration: AtomicU64,
}

/// Named lifecycle hooks layered on the event bus.
///
/// Phases run Pre, Main, Post. Inside a phase callbacks are sorted by
/// priority, reordered so declared dependencies run first, and awaited one at
/// a time.
#[derive(Clone)]
pub struct HookManager {
    inner: Arc<ManagerInner>,
}

impl HookManager {
    /// Manager forwarding every hook occurrence onto `bus`
    pub fn new(bus: EventBus) -> Self {
        Self::with_config(HookManagerConfig::default(), Some(bus))
    }

    pub fn with_config(config: HookManagerConfig, bus: Option<EventBus>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                bus,
                state: Mutex::new(ManagerState::default()),
                next_registration: AtomicU64::new(1),
            }),
        }
    }

    /// Manager with no bus attached
    pub fn standalone() -> Self {
        Self::with_config(HookManagerConfig::default(), None)
    }

    pub fn register(
        &self,
        hook_type: HookType,
        callback: Arc<dyn HookCallback>,
        options: HookOptions,
    ) -> Result<String> {
        let callback_id = options
            .id
            .clone()
            .unwrap_or_else(|| format!("{hook_type}#{}", Uuid::new_v4()));

        if !EventType::Hook(hook_type.clone()).is_canonical() {
            warn!(
                hook_type = %hook_type,
                "Custom hook type shadows a built-in name; use HookType::custom"
            );
        }

        let mut state = self.inner.state.lock();
        if state.callbacks.contains_key(&callback_id) {
            return Err(HookwireError::HookCallback(Box::new(
                HookCallbackError::DuplicateId { callback_id },
            )));
        }

        state.graph.add(&callback_id, &options.dependencies);
        state
            .by_hook
            .entry(hook_type.clone())
            .or_default()
            .push(callback_id.clone());

        debug!(
            hook_type = %hook_type,
            callback_id = %callback_id,
            phase = %options.phase,
            priority = ?options.priority,
            dependencies = ?options.dependencies,
            "Hook callback registered"
        );

        state.callbacks.insert(
            callback_id.clone(),
            CallbackEntry {
                hook_type,
                callback,
                options,
                registration: self.inner.next_registration.fetch_add(1, Ordering::Relaxed),
                execution_count: 0,
                last_executed: None,
            },
        );
        Ok(callback_id)
    }

    pub fn unregister(&self, callback_id: &str) -> bool {
        self.inner.state.lock().remove(callback_id)
    }

    /// Remove every callback for a hook type; returns how many were removed
    pub fn unregister_all(&self, hook_type: &HookType) -> usize {
        let mut state = self.inner.state.lock();
        let ids = state.by_hook.get(hook_type).cloned().unwrap_or_default();
        ids.iter().filter(|id| state.remove(id)).count()
    }

    /// Run every callback registered for `hook_type`.
    ///
    /// Only a callback using [`ErrorStrategy::Throw`] makes this return an
    /// error; every other failure is reported per callback in the report.
    pub async fn execute_hook(
        &self,
        hook_type: HookType,
        target_id: &str,
        payload: Payload,
        source: &str,
    ) -> Result<ExecutionReport> {
        let started = Instant::now();
        let execution_id = Uuid::new_v4().to_string();
        let mut report = ExecutionReport::new(hook_type.clone(), target_id, source, execution_id);

        if !self.has_callbacks(&hook_type) {
            return Ok(report);
        }

        let ctx = HookContext {
            hook_type: hook_type.clone(),
            target_id: target_id.to_string(),
            timestamp: Utc::now(),
            payload,
            source: source.to_string(),
            execution_id: report.execution_id.clone(),
            phase: HookPhase::Pre,
            cancel: CancellationToken::new(),
        };
        self.inner.state.lock().stats.executions += 1;

        self.forward_to_bus(&ctx).await;

        let span = hook_execution_span(&hook_type, target_id, &ctx.execution_id);
        let mut exhausted = Vec::new();
        let aborted = self
            .run_phases(&ctx, &mut report, &mut exhausted)
            .instrument(span)
            .await;

        // Removal happens only after the pass, never mid-iteration
        for callback_id in &exhausted {
            if self.unregister(callback_id) {
                report.mark_removed(callback_id);
                self.inner.state.lock().stats.callbacks_removed += 1;
                debug!(callback_id = %callback_id, "Hook callback reached max executions");
            }
        }

        report.finalize(started.elapsed().as_millis() as u64);
        match aborted {
            Some(err) => Err(err),
            None => {
                info!(
                    hook_type = %hook_type,
                    target_id = %target_id,
                    total = report.total,
                    failed = report.failed,
                    "Hook executed"
                );
                Ok(report)
            }
        }
    }

    async fn forward_to_bus(&self, ctx: &HookContext) {
        if !self.inner.config.forward_to_bus {
            return;
        }
        if let Some(bus) = &self.inner.bus {
            let event = Event::new(EventType::Hook(ctx.hook_type.clone()), ctx.source.clone())
                .with_target(ctx.target_id.clone())
                .with_payload(ctx.payload.clone())
                .with_timestamp(ctx.timestamp);
            bus.publish(event).await;
        }
    }

    async fn run_phases(
        &self,
        ctx: &HookContext,
        report: &mut ExecutionReport,
        exhausted: &mut Vec<String>,
    ) -> Option<HookwireError> {
        for phase in HookPhase::ALL {
            let plan = match self.plan_phase(&ctx.hook_type, phase) {
                Ok(plan) => plan,
                Err(cycle) => {
                    let err = DependencyError::Cycle {
                        hook_type: ctx.hook_type.to_string(),
                        phase: phase.to_string(),
                        cycle: cycle.clone(),
                    };
                    error!(
                        hook_type = %ctx.hook_type,
                        phase = %phase,
                        error = %err,
                        "Dependency cycle, skipping phase"
                    );
                    self.inner.state.lock().stats.cycles_detected += 1;
                    report.phase_errors.push(PhaseError {
                        phase,
                        message: err.to_string(),
                        cycle,
                    });
                    continue;
                }
            };

            for planned in plan {
                let run = self.run_callback(&planned, ctx, phase).await;
                if self.record_execution(&planned.id) {
                    exhausted.push(planned.id.clone());
                }
                match run {
                    CallbackRun::Completed(outcome) => report.results.push(outcome),
                    CallbackRun::Aborted(outcome, err) => {
                        report.results.push(outcome);
                        return Some(err);
                    }
                }
            }
        }
        None
    }

    /// Callbacks of one phase in execution order, or the offending cycle
    fn plan_phase(
        &self,
        hook_type: &HookType,
        phase: HookPhase,
    ) -> std::result::Result<Vec<PlannedCallback>, Vec<String>> {
        let state = self.inner.state.lock();
        let Some(ids) = state.by_hook.get(hook_type) else {
            return Ok(Vec::new());
        };

        let mut selected: Vec<&String> = ids
            .iter()
            .filter(|id| {
                state
                    .callbacks
                    .get(*id)
                    .map_or(false, |entry| entry.options.phase == phase)
            })
            .collect();
        selected.sort_by_key(|id| {
            state
                .callbacks
                .get(*id)
                .map(|entry| (entry.options.priority, entry.registration))
        });
        let selected: Vec<String> = selected.into_iter().cloned().collect();

        let order = state.graph.order(&selected)?;
        Ok(order
            .into_iter()
            .filter_map(|id| {
                state.callbacks.get(&id).map(|entry| PlannedCallback {
                    callback: Arc::clone(&entry.callback),
                    options: entry.options.clone(),
                    id,
                })
            })
            .collect())
    }

    /// Bump the execution count; true once `max_executions` is reached
    fn record_execution(&self, callback_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.callbacks.get_mut(callback_id) else {
            return false;
        };
        entry.execution_count += 1;
        entry.last_executed = Some(Utc::now());
        entry
            .options
            .max_executions
            .map_or(false, |max| entry.execution_count >= max)
    }

    async fn run_callback(
        &self,
        planned: &PlannedCallback,
        ctx: &HookContext,
        phase: HookPhase,
    ) -> CallbackRun {
        let options = &planned.options;
        let strategy = options.error_strategy;
        let max_retries = match strategy {
            ErrorStrategy::Retry => options
                .max_retries
                .unwrap_or(self.inner.config.default_max_retries),
            _ => 0,
        };
        let timeout = options.timeout.or_else(|| {
            self.inner
                .config
                .default_timeout_ms
                .map(Duration::from_millis)
        });

        let started = Instant::now();
        let invocation = ctx.for_invocation(phase);
        let mut attempts = 0;
        let mut timed_out = false;
        let result = loop {
            attempts += 1;
            let attempt = self.invoke(planned, &invocation, timeout).await;
            match attempt {
                Ok(()) => break Ok(()),
                Err(err) => {
                    timed_out = err.is_timeout();
                    if attempts > max_retries {
                        break Err(err);
                    }
                    let delay = self.retry_policy().delay_for(attempts);
                    warn!(
                        callback_id = %planned.id,
                        hook_type = %ctx.hook_type,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Hook callback failed, retrying"
                    );
                    self.inner.state.lock().stats.retries += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let mut outcome = CallbackOutcome {
            callback_id: planned.id.clone(),
            phase,
            status: CallbackStatus::Succeeded,
            success: true,
            error: None,
            duration_ms: 0,
            attempts,
            timed_out: result.is_err() && timed_out,
            removed: false,
        };

        let aborted = match result {
            Ok(()) => None,
            Err(err) => {
                outcome.error = Some(err.to_string());
                outcome.success = false;
                outcome.status = CallbackStatus::Failed;
                error!(
                    callback_id = %planned.id,
                    hook_type = %ctx.hook_type,
                    target_id = %ctx.target_id,
                    phase = %phase,
                    strategy = ?strategy,
                    error = %err,
                    "Hook callback failed"
                );

                match strategy {
                    ErrorStrategy::Throw => Some(HookwireError::HookCallback(Box::new(
                        HookCallbackError::Aborted {
                            callback_id: planned.id.clone(),
                            hook_type: ctx.hook_type.to_string(),
                            phase: phase.to_string(),
                            message: err.to_string(),
                        },
                    ))),
                    ErrorStrategy::Fallback => {
                        if self.recover(planned, &invocation, &err).await {
                            outcome.success = true;
                            outcome.status = CallbackStatus::FallbackRecovered;
                        }
                        None
                    }
                    ErrorStrategy::Log | ErrorStrategy::Retry => None,
                }
            }
        };

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        log_callback_outcome(
            &planned.id,
            phase.as_str(),
            outcome.success,
            started.elapsed().as_millis(),
        );
        self.record_outcome(&outcome);

        match aborted {
            Some(err) => CallbackRun::Aborted(outcome, err),
            None => CallbackRun::Completed(outcome),
        }
    }

    async fn invoke(
        &self,
        planned: &PlannedCallback,
        ctx: &HookContext,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let failed = |err: anyhow::Error| {
            HookwireError::HookCallback(Box::new(HookCallbackError::Failed {
                callback_id: planned.id.clone(),
                hook_type: ctx.hook_type.to_string(),
                message: format!("{err:#}"),
            }))
        };

        let Some(limit) = timeout else {
            return planned.callback.call(ctx).await.map_err(failed);
        };

        // Each attempt gets a fresh token so a retried call is not born cancelled
        let attempt_ctx = HookContext {
            cancel: ctx.cancel.child_token(),
            ..ctx.clone()
        };
        match tokio::time::timeout(limit, planned.callback.call(&attempt_ctx)).await {
            Ok(result) => result.map_err(failed),
            Err(_) => {
                attempt_ctx.cancel.cancel();
                self.inner.state.lock().stats.timeouts += 1;
                Err(HookwireError::HookCallback(Box::new(
                    HookCallbackError::TimedOut {
                        callback_id: planned.id.clone(),
                        hook_type: ctx.hook_type.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    },
                )))
            }
        }
    }

    /// Run the fallback; its own failure is logged and never propagated
    async fn recover(
        &self,
        planned: &PlannedCallback,
        ctx: &HookContext,
        err: &HookwireError,
    ) -> bool {
        let Some(fallback) = &planned.options.fallback else {
            warn!(callback_id = %planned.id, "Fallback strategy without a fallback function");
            return false;
        };

        match fallback.recover(ctx, err).await {
            Ok(()) => {
                info!(callback_id = %planned.id, "Hook callback recovered by fallback");
                true
            }
            Err(fallback_err) => {
                let failure = HookCallbackError::FallbackFailed {
                    callback_id: planned.id.clone(),
                    message: format!("{fallback_err:#}"),
                };
                warn!(error = %failure, "Fallback failed");
                false
            }
        }
    }

    fn record_outcome(&self, outcome: &CallbackOutcome) {
        let mut state = self.inner.state.lock();
        let stats = &mut state.stats;
        stats.callbacks_run += 1;
        match outcome.status {
            CallbackStatus::Succeeded => stats.succeeded += 1,
            CallbackStatus::FallbackRecovered => {
                stats.succeeded += 1;
                stats.fallback_recoveries += 1;
            }
            CallbackStatus::Failed => stats.failed += 1,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        let config = &self.inner.config;
        RetryPolicy::new(
            config.default_max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(config.retry_max_delay_ms))
    }

    /// Every dependency cycle among a hook type's callbacks, across all phases
    pub fn dependency_cycles(&self, hook_type: &HookType) -> Vec<Vec<String>> {
        let state = self.inner.state.lock();
        let ids = state.by_hook.get(hook_type).cloned().unwrap_or_default();
        state.graph.detect_cycles(&ids)
    }

    /// Check a hook type's graph up front without executing anything
    pub fn validate_dependencies(&self, hook_type: &HookType) -> Result<()> {
        match self.dependency_cycles(hook_type).into_iter().next() {
            Some(cycle) => Err(HookwireError::Dependency(Box::new(DependencyError::Cycle {
                hook_type: hook_type.to_string(),
                phase: "any".to_string(),
                cycle,
            }))),
            None => Ok(()),
        }
    }

    pub fn has_callbacks(&self, hook_type: &HookType) -> bool {
        self.inner
            .state
            .lock()
            .by_hook
            .get(hook_type)
            .map_or(false, |ids| !ids.is_empty())
    }

    pub fn callback_count(&self, hook_type: &HookType) -> usize {
        self.inner
            .state
            .lock()
            .by_hook
            .get(hook_type)
            .map_or(0, Vec::len)
    }

    /// Ids in registration order
    pub fn callback_ids(&self, hook_type: &HookType) -> Vec<String> {
        self.inner
            .state
            .lock()
            .by_hook
            .get(hook_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn execution_count(&self, callback_id: &str) -> Option<u32> {
        self.inner
            .state
            .lock()
            .callbacks
            .get(callback_id)
            .map(|entry| entry.execution_count)
    }

    pub fn last_executed(&self, callback_id: &str) -> Option<DateTime<Utc>> {
        self.inner
            .state
            .lock()
            .callbacks
            .get(callback_id)
            .and_then(|entry| entry.last_executed)
    }

    pub fn stats(&self) -> HookStats {
        let state = self.inner.state.lock();
        HookStats {
            registered: state.callbacks.len(),
            ..state.stats.clone()
        }
    }

    pub fn reset_stats(&self) {
        self.inner.state.lock().stats = HookStats::default();
    }

    pub fn bus(&self) -> Option<&EventBus> {
        self.inner.bus.as_ref()
    }
}
