// Bounded history of published events
use crate::events::filter::ReplayFilter;
use crate::events::Event;
use std::collections::VecDeque;
use std::sync::Arc;

/// FIFO that keeps the last `capacity` events
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    events: VecDeque<Arc<Event>>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn push(&mut self, event: Arc<Event>) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Matching events, oldest first; `limit` keeps the newest matches
    pub fn select(&self, filter: &ReplayFilter) -> Vec<Arc<Event>> {
        let mut selected: Vec<Arc<Event>> = self
            .events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            if selected.len() > limit {
                selected.drain(..selected.len() - limit);
            }
        }
        selected
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
