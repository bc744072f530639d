// Explicit context object wiring the bus, hook manager and interest registry
use crate::config::CoreConfig;
use crate::error::Result;
use crate::events::{
    BusMetrics, Event, EventBus, EventHandler, EventType, HookType, Payload, ReplayFilter,
    SubscribeOptions, SubscriptionHandle,
};
use crate::hooks::{ExecutionReport, HookCallback, HookManager, HookOptions, HookStats};
use crate::interest::InterestRegistry;
use crate::logging::utils::{config_loading_span, log_config_validation};
use std::path::Path;
use std::sync::Arc;

/// Constructed once by the host and handed to every collaborator.
///
/// Clones share the same bus, hooks and interest registry.
#[derive(Clone)]
pub struct CoreContext {
    config: Arc<CoreConfig>,
    bus: EventBus,
    hooks: HookManager,
    interests: Arc<InterestRegistry>,
}

impl CoreContext {
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let interests = Arc::new(InterestRegistry::new());
        let bus = EventBus::with_interests(config.bus.clone(), Arc::clone(&interests));
        let hooks = HookManager::with_config(config.hooks.clone(), Some(bus.clone()));

        tracing::debug!(
            replay_capacity = config.bus.replay_capacity,
            breaker_threshold = config.bus.circuit_breaker_threshold,
            batched_types = config.bus.batch.event_types.len(),
            "Core context created"
        );

        Ok(Self {
            config: Arc::new(config),
            bus,
            hooks,
            interests,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let _span = config_loading_span(path).entered();
        let config = CoreConfig::from_file(path);
        log_config_validation(path, config.is_ok());
        Self::new(config?)
    }

    /// Publish a plain event
    pub async fn emit(
        &self,
        event_type: EventType,
        target_id: Option<&str>,
        payload: Payload,
        source: &str,
    ) -> bool {
        let mut event = Event::new(event_type, source).with_payload(payload);
        if let Some(target_id) = target_id {
            event = event.with_target(target_id);
        }
        self.bus.publish(event).await
    }

    pub fn on(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        self.bus.subscribe(event_type, handler, options)
    }

    pub fn once(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        self.bus.subscribe_once(event_type, handler, options)
    }

    pub fn off(&self, handle: &SubscriptionHandle) -> bool {
        self.bus.unsubscribe(handle)
    }

    pub fn register(
        &self,
        hook_type: HookType,
        callback: Arc<dyn HookCallback>,
        options: HookOptions,
    ) -> Result<String> {
        self.hooks.register(hook_type, callback, options)
    }

    pub async fn execute_hook(
        &self,
        hook_type: HookType,
        target_id: &str,
        payload: Payload,
        source: &str,
    ) -> Result<ExecutionReport> {
        self.hooks
            .execute_hook(hook_type, target_id, payload, source)
            .await
    }

    pub fn replay_events(&self, filter: &ReplayFilter) -> Vec<Event> {
        self.bus.replay_events(filter)
    }

    pub async fn replay_to(&self, handler: &dyn EventHandler, filter: &ReplayFilter) -> usize {
        self.bus.replay_to(handler, filter).await
    }

    pub fn declare_interest(&self, subscriber_id: &str, target_id: &str) -> bool {
        self.interests.declare_interest(subscriber_id, target_id)
    }

    pub fn withdraw_interest(&self, subscriber_id: &str, target_id: &str) -> bool {
        self.interests.withdraw_interest(subscriber_id, target_id)
    }

    pub fn metrics(&self) -> BusMetrics {
        self.bus.metrics()
    }

    pub fn stats(&self) -> HookStats {
        self.hooks.stats()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    pub fn interests(&self) -> &Arc<InterestRegistry> {
        &self.interests
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Flush queued batches and cancel pending timers
    pub async fn shutdown(&self) {
        self.bus.shutdown().await;
    }
}
