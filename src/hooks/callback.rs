// Hook callback contracts: phases, strategies, options and the invocation context
use crate::error::HookwireError;
use crate::events::{HookType, Payload, Priority};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Coarse ordering partition within one hook execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    Pre,
    #[default]
    Main,
    Post,
}

impl HookPhase {
    /// Phases in execution order
    pub const ALL: [HookPhase; 3] = [HookPhase::Pre, HookPhase::Main, HookPhase::Post];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::Pre => "pre",
            HookPhase::Main => "main",
            HookPhase::Post => "post",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens when a callback fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Abort the remaining callbacks and return the error to the caller
    Throw,
    /// Record the failure and continue
    #[default]
    Log,
    /// Retry with backoff; exhaustion behaves like `Log`
    Retry,
    /// Run the registered fallback; its own failure is only logged
    Fallback,
}

/// Everything a callback learns about the hook occurrence
#[derive(Debug, Clone)]
pub struct HookContext {
    pub hook_type: HookType,
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub source: String,
    pub execution_id: String,
    pub phase: HookPhase,
    /// Cancelled when the callback's timeout elapses
    pub cancel: CancellationToken,
}

impl HookContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Copy for one callback invocation, with its own cancellation scope
    pub(crate) fn for_invocation(&self, phase: HookPhase) -> Self {
        Self {
            phase,
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }
}

/// A callback attached to a hook type
#[async_trait]
pub trait HookCallback: Send + Sync {
    async fn call(&self, ctx: &HookContext) -> anyhow::Result<()>;
}

/// Recovery function used by [`ErrorStrategy::Fallback`]
#[async_trait]
pub trait HookFallback: Send + Sync {
    async fn recover(&self, ctx: &HookContext, error: &HookwireError) -> anyhow::Result<()>;
}

struct FnCallback<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> HookCallback for FnCallback<F>
where
    F: Fn(HookContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn call(&self, ctx: &HookContext) -> anyhow::Result<()> {
        (self.func)(ctx.clone()).await
    }
}

/// Wrap an async closure as a hook callback
pub fn callback_fn<F, Fut>(func: F) -> Arc<dyn HookCallback>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnCallback { func })
}

struct FnFallback<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> HookFallback for FnFallback<F>
where
    F: Fn(HookContext, String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn recover(&self, ctx: &HookContext, error: &HookwireError) -> anyhow::Result<()> {
        (self.func)(ctx.clone(), error.to_string()).await
    }
}

/// Wrap an async closure as a fallback; it receives the failure message
pub fn fallback_fn<F, Fut>(func: F) -> Arc<dyn HookFallback>
where
    F: Fn(HookContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnFallback { func })
}

/// Registration options for a hook callback
#[derive(Clone, Default)]
pub struct HookOptions {
    pub priority: Priority,
    pub phase: HookPhase,
    /// Removed after the pass in which this many executions is reached
    pub max_executions: Option<u32>,
    /// Falls back to the manager's default timeout
    pub timeout: Option<Duration>,
    pub error_strategy: ErrorStrategy,
    pub fallback: Option<Arc<dyn HookFallback>>,
    /// Falls back to the manager's default retry count
    pub max_retries: Option<u32>,
    /// Callback ids that must run before this one in the same phase
    pub dependencies: Vec<String>,
    pub id: Option<String>,
}

impl HookOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_phase(mut self, phase: HookPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_max_executions(mut self, max_executions: u32) -> Self {
        self.max_executions = Some(max_executions);
        self
    }

    /// Run at most once
    pub fn once(self) -> Self {
        self.with_max_executions(1)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    /// Sets the strategy to [`ErrorStrategy::Fallback`] as well
    pub fn with_fallback(mut self, fallback: Arc<dyn HookFallback>) -> Self {
        self.fallback = Some(fallback);
        self.error_strategy = ErrorStrategy::Fallback;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self.error_strategy = ErrorStrategy::Retry;
        self
    }

    pub fn depends_on(mut self, callback_id: impl Into<String>) -> Self {
        self.dependencies.push(callback_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl fmt::Debug for HookOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookOptions")
            .field("priority", &self.priority)
            .field("phase", &self.phase)
            .field("max_executions", &self.max_executions)
            .field("timeout", &self.timeout)
            .field("error_strategy", &self.error_strategy)
            .field("fallback", &self.fallback.as_ref().map(|_| "<fallback>"))
            .field("max_retries", &self.max_retries)
            .field("dependencies", &self.dependencies)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> HookContext {
        HookContext {
            hook_type: HookType::ObjectLoad,
            target_id: "crate-7".to_string(),
            timestamp: Utc::now(),
            payload: Payload::Empty,
            source: "scene".to_string(),
            execution_id: "exec-1".to_string(),
            phase: HookPhase::Main,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_defaults() {
        let options = HookOptions::new();
        assert_eq!(options.priority, Priority::Normal);
        assert_eq!(options.phase, HookPhase::Main);
        assert_eq!(options.error_strategy, ErrorStrategy::Log);
        assert_eq!(options.max_executions, None);
    }

    #[test]
    fn test_once_and_strategy_builders() {
        let options = HookOptions::new().once().with_retries(2);
        assert_eq!(options.max_executions, Some(1));
        assert_eq!(options.error_strategy, ErrorStrategy::Retry);
        assert_eq!(options.max_retries, Some(2));

        let fallback = fallback_fn(|_ctx, _message| async { Ok(()) });
        let options = HookOptions::new().with_fallback(fallback);
        assert_eq!(options.error_strategy, ErrorStrategy::Fallback);
    }

    #[test]
    fn test_phase_order() {
        assert_eq!(
            HookPhase::ALL.map(|phase| phase.as_str()),
            ["pre", "main", "post"]
        );
    }

    #[test]
    fn test_invocation_token_is_child_scope() {
        let ctx = context();
        let invocation = ctx.for_invocation(HookPhase::Post);
        invocation.cancel.cancel();

        assert!(invocation.is_cancelled());
        assert!(!ctx.is_cancelled());
        assert_eq!(invocation.phase, HookPhase::Post);
    }

    #[tokio::test]
    async fn test_callback_fn_sees_context() {
        let callback = callback_fn(|ctx: HookContext| async move {
            anyhow::ensure!(ctx.target_id == "crate-7", "wrong target");
            Ok(())
        });
        callback.call(&context()).await.unwrap();
    }
}
