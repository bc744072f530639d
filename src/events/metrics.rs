// Event bus metrics collection and reporting
use crate::events::EventType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// One handler timing sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerTiming {
    pub handler_id: String,
    pub event_type: EventType,
    pub duration: Duration,
    pub success: bool,
}

/// Counters polled by monitoring surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMetrics {
    pub emitted: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub filtered: u64,
    pub batched: u64,
    pub debounced: u64,
    pub breaker_skips: u64,
    pub handler_errors: u64,
    pub handler_timeouts: u64,
    pub handler_retries: u64,
    pub events_by_type: HashMap<EventType, u64>,
    pub timing_samples: VecDeque<HandlerTiming>,
    timing_capacity: usize,
}

impl BusMetrics {
    pub fn new(timing_capacity: usize) -> Self {
        Self {
            emitted: 0,
            delivered: 0,
            dropped: 0,
            filtered: 0,
            batched: 0,
            debounced: 0,
            breaker_skips: 0,
            handler_errors: 0,
            handler_timeouts: 0,
            handler_retries: 0,
            events_by_type: HashMap::new(),
            timing_samples: VecDeque::with_capacity(timing_capacity),
            timing_capacity,
        }
    }

    pub fn record_emitted(&mut self, event_type: &EventType) {
        self.emitted += 1;
        *self.events_by_type.entry(event_type.clone()).or_insert(0) += 1;
    }

    pub fn record_timing(&mut self, timing: HandlerTiming) {
        if self.timing_capacity == 0 {
            return;
        }
        if self.timing_samples.len() == self.timing_capacity {
            self.timing_samples.pop_front();
        }
        self.timing_samples.push_back(timing);
    }

    pub fn events_of_type(&self, event_type: &EventType) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }

    /// Average over the retained timing samples
    pub fn average_handler_time(&self) -> Option<Duration> {
        if self.timing_samples.is_empty() {
            return None;
        }

        let total_nanos: u128 = self
            .timing_samples
            .iter()
            .map(|t| t.duration.as_nanos())
            .sum();
        let average_nanos = total_nanos / self.timing_samples.len() as u128;
        Some(Duration::from_nanos(average_nanos as u64))
    }

    pub fn handler_success_rate(&self) -> f64 {
        let attempts = self.delivered + self.handler_errors;
        if attempts == 0 {
            return 1.0;
        }
        self.delivered as f64 / attempts as f64
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.timing_capacity);
    }

    /// Get metrics summary as formatted string
    pub fn summary(&self) -> String {
        format!(
            "Event Bus Metrics:\n\
             - Emitted: {}\n\
             - Delivered: {}\n\
             - Dropped: {}\n\
             - Filtered: {}\n\
             - Batched: {}\n\
             - Debounced: {}\n\
             - Breaker skips: {}\n\
             - Handler errors: {} (timeouts: {}, retries: {})\n\
             - Handler success rate: {:.2}%\n\
             - Average handler time: {:?}",
            self.emitted,
            self.delivered,
            self.dropped,
            self.filtered,
            self.batched,
            self.debounced,
            self.breaker_skips,
            self.handler_errors,
            self.handler_timeouts,
            self.handler_retries,
            self.handler_success_rate() * 100.0,
            self.average_handler_time(),
        )
    }
}

impl Default for BusMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}
