// Event bus: priority-ordered delivery with shaping and per-handler resilience
use crate::config::BusConfig;
use crate::error::{HandlerError, HookwireError};
use crate::events::breaker::{Admission, CircuitBreaker, CircuitState, RetryPolicy};
use crate::events::filter::{DeliveryFilter, ReplayFilter};
use crate::events::handler::{insert_sorted, Registration};
use crate::events::metrics::{BusMetrics, HandlerTiming};
use crate::events::replay::ReplayBuffer;
use crate::events::shaping::{BatchAction, ShapingMode, ShapingPolicy, ShapingState};
use crate::events::{Event, EventHandler, EventType, SubscribeOptions, SubscriptionHandle};
use crate::interest::InterestRegistry;
use crate::logging::utils::{log_handler_failure, publish_span};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

tokio::task_local! {
    /// Buses whose batch queue the current task is already draining
    static DRAINING: Vec<usize>;
}

struct BusInner {
    config: BusConfig,
    enabled: AtomicBool,
    policy: ShapingPolicy,
    delivery_filter: DeliveryFilter,
    handler_timeout: Option<Duration>,
    handlers: RwLock<HashMap<EventType, Vec<Registration>>>,
    next_registration: AtomicU64,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    shaping: Mutex<ShapingState>,
    /// Serializes batch drains so batches reach handlers in enqueue order
    flush_guard: tokio::sync::Mutex<()>,
    metrics: Mutex<BusMetrics>,
    replay: Mutex<ReplayBuffer>,
    interests: Arc<InterestRegistry>,
}

/// In-process publish/subscribe bus.
///
/// Cloning is cheap and every clone shares the same registries. Within one
/// `publish` call handlers run one after another in ascending priority order.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: BusConfig) -> Self {
        Self::with_interests(config, Arc::new(InterestRegistry::new()))
    }

    /// Create a bus whose interest filter is backed by a shared registry
    pub fn with_interests(config: BusConfig, interests: Arc<InterestRegistry>) -> Self {
        let policy = ShapingPolicy::from_config(&config);
        let delivery_filter = config.delivery_filter();
        let handler_timeout = config.handler_timeout();
        let replay = ReplayBuffer::new(config.replay_capacity);
        let metrics = BusMetrics::new(config.timing_sample_capacity);

        Self {
            inner: Arc::new(BusInner {
                enabled: AtomicBool::new(config.enabled),
                policy,
                delivery_filter,
                handler_timeout,
                handlers: RwLock::new(HashMap::new()),
                next_registration: AtomicU64::new(1),
                breakers: Mutex::new(HashMap::new()),
                shaping: Mutex::new(ShapingState::new()),
                flush_guard: tokio::sync::Mutex::new(()),
                metrics: Mutex::new(metrics),
                replay: Mutex::new(replay),
                interests,
                config,
            }),
        }
    }

    /// Register a handler for one event type
    pub fn subscribe(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        let registration_id = self.inner.next_registration.fetch_add(1, Ordering::Relaxed);
        let registration = Registration::new(handler, options, registration_id);
        let handle = SubscriptionHandle {
            event_type: event_type.clone(),
            handler_id: registration.handler_id.clone(),
            registration: registration_id,
        };

        if !event_type.is_canonical() {
            tracing::warn!(
                event_type = %event_type,
                "Custom event type shadows a built-in name; use EventType::custom"
            );
        }
        tracing::debug!(
            event_type = %event_type,
            handler_id = %registration.handler_id,
            priority = ?registration.priority,
            once = registration.once,
            "Handler subscribed"
        );

        let mut handlers = self.inner.handlers.write();
        insert_sorted(handlers.entry(event_type).or_default(), registration);
        handle
    }

    /// Register a handler that is removed after its first invocation
    pub fn subscribe_once(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        self.subscribe(event_type, handler, options.once())
    }

    /// Remove a registration; absent handles are not an error
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.remove_registration(&handle.event_type, handle.registration)
    }

    /// Remove the first registration for `event_type` with the given handler id
    pub fn unsubscribe_handler(&self, event_type: &EventType, handler_id: &str) -> bool {
        let removed = {
            let mut handlers = self.inner.handlers.write();
            let Some(list) = handlers.get_mut(event_type) else {
                return false;
            };
            let removed = list
                .iter()
                .position(|r| r.handler_id == handler_id)
                .map(|index| list.remove(index));
            if list.is_empty() {
                handlers.remove(event_type);
            }
            removed
        };
        match removed {
            Some(registration) => {
                self.release_breaker(&registration);
                true
            }
            None => false,
        }
    }

    fn remove_registration(&self, event_type: &EventType, registration: u64) -> bool {
        let removed = {
            let mut handlers = self.inner.handlers.write();
            let Some(list) = handlers.get_mut(event_type) else {
                return false;
            };
            let removed = list
                .iter()
                .position(|r| r.registration == registration)
                .map(|index| list.remove(index));
            if list.is_empty() {
                handlers.remove(event_type);
            }
            removed
        };
        match removed {
            Some(registration) => {
                self.release_breaker(&registration);
                true
            }
            None => false,
        }
    }

    /// Breaker history outlives a registration only under a caller-supplied id
    fn release_breaker(&self, registration: &Registration) {
        if registration.generated_id {
            self.inner.breakers.lock().remove(&registration.handler_id);
        }
    }

    /// Publish an event.
    ///
    /// Returns `true` when the event was delivered or accepted for deferred
    /// (debounced or batched) delivery and `false` when it was dropped.
    pub async fn publish(&self, event: Event) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let event = Arc::new(event.stamped());
        self.inner.metrics.lock().record_emitted(&event.event_type);
        self.inner.replay.lock().push(Arc::clone(&event));

        let span = publish_span(&event.event_type, event.target());
        match self.inner.policy.mode_for(&event.event_type) {
            ShapingMode::Debounce(interval) => {
                self.schedule_debounced(event, interval);
                true
            }
            ShapingMode::Throttle(interval) => {
                let admitted = self.inner.shaping.lock().admit_throttled(
                    &event.event_type,
                    interval,
                    Instant::now(),
                );
                if !admitted {
                    self.inner.metrics.lock().dropped += 1;
                    tracing::debug!(event_type = %event.event_type, "Event throttled");
                    return false;
                }
                self.deliver(event).instrument(span).await
            }
            ShapingMode::Batch => {
                self.enqueue_batch(event).instrument(span).await;
                true
            }
            ShapingMode::Immediate => self.deliver(event).instrument(span).await,
        }
    }

    fn schedule_debounced(&self, event: Arc<Event>, interval: Duration) {
        let event_type = event.event_type.clone();
        let superseded = {
            let mut shaping = self.inner.shaping.lock();
            let generation = shaping.next_debounce_generation();
            let bus = self.clone();
            let timer_type = event_type.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                let current = bus.inner.shaping.lock().finish_debounce(&timer_type, generation);
                if current {
                    bus.deliver(event).await;
                }
            });
            shaping.replace_debounce(event_type.clone(), generation, timer)
        };

        if superseded {
            self.inner.metrics.lock().debounced += 1;
            tracing::trace!(event_type = %event_type, "Debounced event superseded");
        }
    }

    async fn enqueue_batch(&self, event: Arc<Event>) {
        let threshold = {
            let mut shaping = self.inner.shaping.lock();
            match shaping.enqueue_batch(event, self.inner.policy.max_batch_size) {
                BatchAction::ThresholdReached => true,
                BatchAction::StartTimer => {
                    shaping.set_batch_timer(self.spawn_batch_timer());
                    false
                }
                BatchAction::Queued => false,
            }
        };
        self.inner.metrics.lock().batched += 1;

        if threshold {
            tracing::trace!("Batch size threshold reached");
            self.drain_batches(false).await;
        }
    }

    fn spawn_batch_timer(&self) -> JoinHandle<()> {
        let bus = self.clone();
        let interval = self.inner.policy.flush_interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            bus.drain_batches(true).await;
        })
    }

    /// Deliver every queued batch event now, in enqueue order.
    ///
    /// Called from a handler while this bus is already draining, it returns 0
    /// and the running drain delivers the queue.
    pub async fn flush_batches(&self) -> usize {
        self.drain_batches(false).await
    }

    fn drain_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Drain the batch queue under the flush guard until it stays empty.
    ///
    /// `timer_owned` is set only by the batch timer task, which must release
    /// its own slot instead of aborting itself.
    async fn drain_batches(&self, timer_owned: bool) -> usize {
        let key = self.drain_key();
        let mut draining = DRAINING.try_with(|keys| keys.clone()).unwrap_or_default();
        if draining.contains(&key) {
            return 0;
        }
        draining.push(key);

        let _guard = self.inner.flush_guard.lock().await;
        DRAINING
            .scope(draining, self.drain_locked(timer_owned))
            .await
    }

    async fn drain_locked(&self, mut timer_owned: bool) -> usize {
        let mut delivered = 0;
        loop {
            let events = {
                let mut shaping = self.inner.shaping.lock();
                if timer_owned {
                    timer_owned = false;
                    shaping.take_batch()
                } else {
                    shaping.flush_batch()
                }
            };
            if events.is_empty() {
                return delivered;
            }
            delivered += self.deliver_all(events).await;
        }
    }

    async fn deliver_all(&self, events: Vec<Arc<Event>>) -> usize {
        let count = events.len();
        for event in events {
            self.deliver(event).await;
        }
        count
    }

    /// Cancel pending shaping timers. Queued batch events are delivered; pending
    /// debounced events are discarded.
    pub async fn shutdown(&self) {
        self.inner.shaping.lock().cancel_timers();
        self.drain_batches(false).await;
    }

    async fn deliver(&self, event: Arc<Event>) -> bool {
        if let Err(rejection) = self.inner.delivery_filter.check(&event, Utc::now()) {
            self.inner.metrics.lock().filtered += 1;
            tracing::debug!(
                event_type = %event.event_type,
                reason = ?rejection,
                "Event filtered before delivery"
            );
            return false;
        }

        let interest = self.inner.interests.interested_subscribers(&event);
        let snapshot: Vec<Registration> = self
            .inner
            .handlers
            .read()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for registration in snapshot {
            if !interest.admits(registration.subscriber_id.as_deref())
                || !registration.accepts(&event)
            {
                continue;
            }

            if self.admit(&registration.handler_id) == Admission::Rejected {
                self.inner.metrics.lock().breaker_skips += 1;
                tracing::debug!(
                    handler_id = %registration.handler_id,
                    event_type = %event.event_type,
                    "Circuit open, skipping handler"
                );
                continue;
            }

            // Claim a once handler before running it so it can never fire twice
            if registration.once
                && !self.remove_registration(&event.event_type, registration.registration)
            {
                continue;
            }

            self.invoke(&registration, &event).await;
            if registration.once {
                self.release_breaker(&registration);
            }
        }

        true
    }

    async fn invoke(&self, registration: &Registration, event: &Event) {
        let started = Instant::now();
        match self.call_handler(registration, event).await {
            Ok(()) => self.record_success(registration, event, started.elapsed()),
            Err(error) => {
                self.record_failure(registration, event, &error, started.elapsed());
                if let Some(policy) = &registration.retry {
                    self.retry(registration, event, policy).await;
                }
            }
        }
    }

    async fn retry(&self, registration: &Registration, event: &Event, policy: &RetryPolicy) {
        for attempt in 1..=policy.max_retries {
            tokio::time::sleep(policy.delay_for(attempt)).await;

            if self.admit(&registration.handler_id) == Admission::Rejected {
                tracing::debug!(
                    handler_id = %registration.handler_id,
                    attempt,
                    "Circuit open, abandoning retries"
                );
                return;
            }

            self.inner.metrics.lock().handler_retries += 1;
            let started = Instant::now();
            match self.call_handler(registration, event).await {
                Ok(()) => {
                    self.record_success(registration, event, started.elapsed());
                    tracing::info!(
                        handler_id = %registration.handler_id,
                        event_type = %event.event_type,
                        attempt,
                        "Handler recovered after retry"
                    );
                    return;
                }
                Err(error) => {
                    self.record_failure(registration, event, &error, started.elapsed());
                }
            }
        }
    }

    async fn call_handler(
        &self,
        registration: &Registration,
        event: &Event,
    ) -> Result<(), HookwireError> {
        let call = registration.handler.handle_event(event);
        let outcome = match self.inner.handler_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(HookwireError::Handler(Box::new(HandlerError::TimedOut {
                        handler_id: registration.handler_id.clone(),
                        event_type: event.event_type.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })))
                }
            },
            None => call.await,
        };

        outcome.map_err(|err| {
            HookwireError::Handler(Box::new(HandlerError::Failed {
                handler_id: registration.handler_id.clone(),
                event_type: event.event_type.to_string(),
                message: format!("{err:#}"),
            }))
        })
    }

    fn admit(&self, handler_id: &str) -> Admission {
        match self.inner.breakers.lock().get_mut(handler_id) {
            Some(breaker) => breaker.admit(Instant::now()),
            None => Admission::Allowed,
        }
    }

    fn record_success(&self, registration: &Registration, event: &Event, duration: Duration) {
        {
            let mut metrics = self.inner.metrics.lock();
            metrics.delivered += 1;
            metrics.record_timing(HandlerTiming {
                handler_id: registration.handler_id.clone(),
                event_type: event.event_type.clone(),
                duration,
                success: true,
            });
        }

        if let Some(breaker) = self.inner.breakers.lock().get_mut(&registration.handler_id) {
            if breaker.state() != CircuitState::Closed {
                tracing::info!(handler_id = %registration.handler_id, "Circuit closed");
            }
            breaker.record_success();
        }
    }

    fn record_failure(
        &self,
        registration: &Registration,
        event: &Event,
        error: &HookwireError,
        duration: Duration,
    ) {
        log_handler_failure(&registration.handler_id, event, error);

        {
            let mut metrics = self.inner.metrics.lock();
            metrics.handler_errors += 1;
            if error.is_timeout() {
                metrics.handler_timeouts += 1;
            }
            metrics.record_timing(HandlerTiming {
                handler_id: registration.handler_id.clone(),
                event_type: event.event_type.clone(),
                duration,
                success: false,
            });
        }

        let opened = {
            let mut breakers = self.inner.breakers.lock();
            let breaker = breakers
                .entry(registration.handler_id.clone())
                .or_insert_with(|| {
                    CircuitBreaker::new(
                        self.inner.config.circuit_breaker_threshold,
                        self.inner.config.circuit_breaker_cooldown(),
                    )
                });
            breaker.record_failure(Instant::now())
        };

        if opened {
            tracing::warn!(
                handler_id = %registration.handler_id,
                event_type = %event.event_type,
                cooldown_ms = self.inner.config.circuit_breaker_cooldown_ms,
                "Circuit opened for handler"
            );
        }
    }

    /// Buffered history matching `filter`, oldest first
    pub fn replay_events(&self, filter: &ReplayFilter) -> Vec<Event> {
        self.inner
            .replay
            .lock()
            .select(filter)
            .into_iter()
            .map(|event| (*event).clone())
            .collect()
    }

    /// Re-deliver buffered history to one late-joining handler; returns successful deliveries
    pub async fn replay_to(&self, handler: &dyn EventHandler, filter: &ReplayFilter) -> usize {
        let history = self.inner.replay.lock().select(filter);
        let mut delivered = 0;
        for event in history {
            match handler.handle_event(&event).await {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!(
                    handler = handler.name(),
                    event_type = %event.event_type,
                    error = %err,
                    "Replay delivery failed"
                ),
            }
        }
        delivered
    }

    /// Get current metrics
    pub fn metrics(&self) -> BusMetrics {
        self.inner.metrics.lock().clone()
    }

    pub fn reset_metrics(&self) {
        self.inner.metrics.lock().reset();
    }

    pub fn subscriber_count(&self, event_type: &EventType) -> usize {
        self.inner
            .handlers
            .read()
            .get(event_type)
            .map_or(0, |list| list.len())
    }

    /// Handler ids for a type, in delivery order
    pub fn handler_ids(&self, event_type: &EventType) -> Vec<String> {
        self.inner
            .handlers
            .read()
            .get(event_type)
            .map(|list| list.iter().map(|r| r.handler_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Clear one type's subscribers, or all of them; returns how many were removed
    pub fn clear_subscribers(&self, event_type: Option<&EventType>) -> usize {
        let removed: Vec<Registration> = {
            let mut handlers = self.inner.handlers.write();
            match event_type {
                Some(event_type) => handlers.remove(event_type).unwrap_or_default(),
                None => handlers.drain().flat_map(|(_, list)| list).collect(),
            }
        };
        for registration in &removed {
            self.release_breaker(registration);
        }
        removed.len()
    }

    /// Number of handler ids with breaker history
    pub fn tracked_breakers(&self) -> usize {
        self.inner.breakers.lock().len()
    }

    pub fn breaker_state(&self, handler_id: &str) -> Option<CircuitState> {
        self.inner
            .breakers
            .lock()
            .get(handler_id)
            .map(|breaker| breaker.state())
    }

    pub fn reset_breaker(&self, handler_id: &str) -> bool {
        self.inner.breakers.lock().remove(handler_id).is_some()
    }

    pub fn pending_debounces(&self) -> usize {
        self.inner.shaping.lock().pending_debounces()
    }

    pub fn queued_batch_len(&self) -> usize {
        self.inner.shaping.lock().queued_batch_len()
    }

    pub fn replay_len(&self) -> usize {
        self.inner.replay.lock().len()
    }

    pub fn interests(&self) -> &Arc<InterestRegistry> {
        &self.inner.interests
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable event emission
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
