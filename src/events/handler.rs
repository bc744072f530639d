// Event handlers and subscription options
use crate::events::breaker::RetryPolicy;
use crate::events::{Event, EventType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Priority levels shared by bus handlers and hook callbacks.
///
/// Ordering is ascending: `Critical` sorts first and runs first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Background = 4,
}

/// Trait for handling events delivered by the bus
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one delivered event
    async fn handle_event(&self, event: &Event) -> anyhow::Result<()>;

    /// Human readable name used in logs when no handler id is supplied
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle_event(&self, event: &Event) -> anyhow::Result<()> {
        (self.func)(event.clone()).await
    }

    fn name(&self) -> &str {
        "fn_handler"
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler::new(func))
}

/// Per-handler delivery predicate
pub type HandlerFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Options supplied at subscription time
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    pub priority: Priority,
    pub once: bool,
    pub filter: Option<HandlerFilter>,
    /// Logical subscriber used by the interest filter
    pub subscriber_id: Option<String>,
    /// Stable identity for breaker and retry state; generated when absent
    pub handler_id: Option<String>,
    pub retry: Option<RetryPolicy>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_subscriber(mut self, subscriber_id: impl Into<String>) -> Self {
        self.subscriber_id = Some(subscriber_id.into());
        self
    }

    pub fn with_handler_id(mut self, handler_id: impl Into<String>) -> Self {
        self.handler_id = Some(handler_id.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("priority", &self.priority)
            .field("once", &self.once)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("subscriber_id", &self.subscriber_id)
            .field("handler_id", &self.handler_id)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Returned by `subscribe`; identifies one registration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub event_type: EventType,
    pub handler_id: String,
    pub(crate) registration: u64,
}

/// One entry in a type's priority-sorted handler list
#[derive(Clone)]
pub(crate) struct Registration {
    pub handler: Arc<dyn EventHandler>,
    pub handler_id: String,
    /// The id was generated here, so no later registration can share its breaker
    pub generated_id: bool,
    pub registration: u64,
    pub priority: Priority,
    pub once: bool,
    pub filter: Option<HandlerFilter>,
    pub subscriber_id: Option<String>,
    pub retry: Option<RetryPolicy>,
}

impl Registration {
    pub fn new(handler: Arc<dyn EventHandler>, options: SubscribeOptions, registration: u64) -> Self {
        let generated_id = options.handler_id.is_none();
        let handler_id = options
            .handler_id
            .unwrap_or_else(|| format!("{}#{}", handler.name(), Uuid::new_v4()));
        Self {
            handler,
            handler_id,
            generated_id,
            registration,
            priority: options.priority,
            once: options.once,
            filter: options.filter,
            subscriber_id: options.subscriber_id,
            retry: options.retry,
        }
    }

    pub fn accepts(&self, event: &Event) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

/// Insert keeping ascending priority; equal priorities keep registration order
pub(crate) fn insert_sorted(list: &mut Vec<Registration>, entry: Registration) {
    let position = list.partition_point(|existing| existing.priority <= entry.priority);
    list.insert(position, entry);
}

/// Built-in handler that logs every delivered event
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

impl LoggingEventHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &Event) -> anyhow::Result<()> {
        tracing::info!(
            event_type = %event.event_type,
            target_id = event.target().unwrap_or("-"),
            source = %event.source,
            "Event delivered"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging_event_handler"
    }
}
