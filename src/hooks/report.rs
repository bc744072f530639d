// Execution reports and aggregate hook statistics
use crate::events::HookType;
use crate::hooks::callback::HookPhase;
use serde::{Deserialize, Serialize};

/// Final state of one callback within one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Succeeded,
    Failed,
    /// Failed, then its fallback succeeded
    FallbackRecovered,
}

/// Per-callback entry of an [`ExecutionReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackOutcome {
    pub callback_id: String,
    pub phase: HookPhase,
    pub status: CallbackStatus,
    pub success: bool,
    /// Present on failure, and also on fallback recovery
    pub error: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub timed_out: bool,
    /// Removed after this pass because `max_executions` was reached
    pub removed: bool,
}

/// A phase that could not run at all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseError {
    pub phase: HookPhase,
    pub message: String,
    pub cycle: Vec<String>,
}

/// Structured result of one `execute_hook` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub execution_id: String,
    pub hook_type: HookType,
    pub target_id: String,
    pub source: String,
    pub results: Vec<CallbackOutcome>,
    pub phase_errors: Vec<PhaseError>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl ExecutionReport {
    pub fn new(hook_type: HookType, target_id: &str, source: &str, execution_id: String) -> Self {
        Self {
            execution_id,
            hook_type,
            target_id: target_id.to_string(),
            source: source.to_string(),
            results: Vec::new(),
            phase_errors: Vec::new(),
            total: 0,
            succeeded: 0,
            failed: 0,
            duration_ms: 0,
        }
    }

    pub(crate) fn finalize(&mut self, duration_ms: u64) {
        self.total = self.results.len();
        self.succeeded = self.results.iter().filter(|r| r.success).count();
        self.failed = self.total - self.succeeded;
        self.duration_ms = duration_ms;
    }

    pub(crate) fn mark_removed(&mut self, callback_id: &str) {
        for outcome in self
            .results
            .iter_mut()
            .filter(|outcome| outcome.callback_id == callback_id)
        {
            outcome.removed = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.phase_errors.is_empty()
    }

    /// True when every callback succeeded and every phase ran
    pub fn is_success(&self) -> bool {
        self.phase_errors.is_empty() && self.results.iter().all(|r| r.success)
    }

    pub fn outcome(&self, callback_id: &str) -> Option<&CallbackOutcome> {
        self.results.iter().find(|r| r.callback_id == callback_id)
    }

    /// Index in execution order
    pub fn position(&self, callback_id: &str) -> Option<usize> {
        self.results.iter().position(|r| r.callback_id == callback_id)
    }

    pub fn callback_ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.callback_id.as_str()).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "hook {} on {}: {} callbacks, {} succeeded, {} failed, {} phase errors in {}ms",
            self.hook_type,
            self.target_id,
            self.total,
            self.succeeded,
            self.failed,
            self.phase_errors.len(),
            self.duration_ms
        )
    }
}

/// Lifetime counters for a hook manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookStats {
    pub registered: usize,
    pub executions: u64,
    pub callbacks_run: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub fallback_recoveries: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub cycles_detected: u64,
    pub callbacks_removed: u64,
}
