// Traffic shaping state: debounce, throttle and batching
use crate::config::BusConfig;
use crate::events::{Event, EventType};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Which shaping layer applies to an event type, checked in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapingMode {
    Debounce(Duration),
    Throttle(Duration),
    Batch,
    Immediate,
}

/// Static shaping configuration resolved from [`BusConfig`]
#[derive(Debug, Clone)]
pub struct ShapingPolicy {
    debounce: HashMap<EventType, Duration>,
    throttle: HashMap<EventType, Duration>,
    batch_types: HashSet<EventType>,
    pub max_batch_size: usize,
    pub flush_interval: Duration,
}

impl ShapingPolicy {
    pub fn from_config(config: &BusConfig) -> Self {
        Self {
            debounce: config
                .debounce_ms
                .iter()
                .map(|(event_type, ms)| (event_type.clone(), Duration::from_millis(*ms)))
                .collect(),
            throttle: config
                .throttle_ms
                .iter()
                .map(|(event_type, ms)| (event_type.clone(), Duration::from_millis(*ms)))
                .collect(),
            batch_types: config.batch.event_types.iter().cloned().collect(),
            max_batch_size: config.batch.max_batch_size.max(1),
            flush_interval: Duration::from_millis(config.batch.flush_interval_ms),
        }
    }

    pub fn mode_for(&self, event_type: &EventType) -> ShapingMode {
        if let Some(interval) = self.debounce.get(event_type) {
            ShapingMode::Debounce(*interval)
        } else if let Some(interval) = self.throttle.get(event_type) {
            ShapingMode::Throttle(*interval)
        } else if self.batch_types.contains(event_type) {
            ShapingMode::Batch
        } else {
            ShapingMode::Immediate
        }
    }
}

/// Result of enqueueing into the shared batch queue
pub enum BatchAction {
    /// Threshold reached; the queue must be drained now
    ThresholdReached,
    /// First event of a new batch; a flush timer must be started
    StartTimer,
    Queued,
}

/// Mutable shaping bookkeeping, guarded by the bus
#[derive(Default)]
pub struct ShapingState {
    debounce_timers: HashMap<EventType, (u64, JoinHandle<()>)>,
    debounce_generation: u64,
    last_delivery: HashMap<EventType, Instant>,
    batch_queue: VecDeque<Arc<Event>>,
    batch_timer: Option<JoinHandle<()>>,
}

impl ShapingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a generation for a new debounce timer
    pub fn next_debounce_generation(&mut self) -> u64 {
        self.debounce_generation += 1;
        self.debounce_generation
    }

    /// Install a debounce timer, aborting the pending one; returns true if one was superseded
    pub fn replace_debounce(&mut self, event_type: EventType, generation: u64, timer: JoinHandle<()>) -> bool {
        match self.debounce_timers.insert(event_type, (generation, timer)) {
            Some((_, previous)) => {
                previous.abort();
                true
            }
            None => false,
        }
    }

    /// Called by a firing timer; false if a newer timer has replaced it
    pub fn finish_debounce(&mut self, event_type: &EventType, generation: u64) -> bool {
        match self.debounce_timers.get(event_type) {
            Some((current, _)) if *current == generation => {
                self.debounce_timers.remove(event_type);
                true
            }
            _ => false,
        }
    }

    pub fn pending_debounces(&self) -> usize {
        self.debounce_timers.len()
    }

    /// Throttle gate: admits and records the delivery time, or rejects
    pub fn admit_throttled(&mut self, event_type: &EventType, interval: Duration, now: Instant) -> bool {
        match self.last_delivery.get(event_type) {
            Some(last) if now.duration_since(*last) < interval => false,
            _ => {
                self.last_delivery.insert(event_type.clone(), now);
                true
            }
        }
    }

    pub fn enqueue_batch(&mut self, event: Arc<Event>, max_batch_size: usize) -> BatchAction {
        self.batch_queue.push_back(event);
        if self.batch_queue.len() >= max_batch_size {
            BatchAction::ThresholdReached
        } else if self.batch_timer.is_none() {
            BatchAction::StartTimer
        } else {
            BatchAction::Queued
        }
    }

    pub fn set_batch_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.batch_timer.replace(timer) {
            previous.abort();
        }
    }

    /// Drain the queue for delivery; the timer slot is released without aborting the caller
    pub fn take_batch(&mut self) -> Vec<Arc<Event>> {
        self.batch_timer = None;
        self.batch_queue.drain(..).collect()
    }

    /// Drain the queue on demand, cancelling the pending flush timer
    pub fn flush_batch(&mut self) -> Vec<Arc<Event>> {
        if let Some(timer) = self.batch_timer.take() {
            timer.abort();
        }
        self.batch_queue.drain(..).collect()
    }

    pub fn queued_batch_len(&self) -> usize {
        self.batch_queue.len()
    }

    /// Abort every pending timer; queued batch events stay queued
    pub fn cancel_timers(&mut self) {
        for (_, (_, timer)) in self.debounce_timers.drain() {
            timer.abort();
        }
        if let Some(timer) = self.batch_timer.take() {
            timer.abort();
        }
    }
}
