// Interest registry: which logical subscribers care about which targets
use crate::events::Event;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Answer to "who should receive this event"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterestSet {
    /// Nobody has declared interest in the target; deliver to everyone
    All,
    Only(HashSet<String>),
}

impl InterestSet {
    /// Handlers without a subscriber id are never interest-scoped
    pub fn admits(&self, subscriber_id: Option<&str>) -> bool {
        match (self, subscriber_id) {
            (InterestSet::All, _) | (_, None) => true,
            (InterestSet::Only(subscribers), Some(id)) => subscribers.contains(id),
        }
    }
}

/// Populated by collaborators declaring interest in targets
#[derive(Debug, Default)]
pub struct InterestRegistry {
    by_target: RwLock<HashMap<String, HashSet<String>>>,
}

impl InterestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the interest was already declared
    pub fn declare_interest(&self, subscriber_id: &str, target_id: &str) -> bool {
        self.by_target
            .write()
            .entry(target_id.to_string())
            .or_default()
            .insert(subscriber_id.to_string())
    }

    pub fn withdraw_interest(&self, subscriber_id: &str, target_id: &str) -> bool {
        let mut by_target = self.by_target.write();
        let Some(subscribers) = by_target.get_mut(target_id) else {
            return false;
        };
        let removed = subscribers.remove(subscriber_id);
        if subscribers.is_empty() {
            by_target.remove(target_id);
        }
        removed
    }

    /// Drop every interest held by a subscriber; returns how many were removed
    pub fn remove_subscriber(&self, subscriber_id: &str) -> usize {
        let mut by_target = self.by_target.write();
        let mut removed = 0;
        by_target.retain(|_, subscribers| {
            if subscribers.remove(subscriber_id) {
                removed += 1;
            }
            !subscribers.is_empty()
        });
        removed
    }

    pub fn interested_subscribers(&self, event: &Event) -> InterestSet {
        let Some(target_id) = event.target() else {
            return InterestSet::All;
        };
        match self.by_target.read().get(target_id) {
            Some(subscribers) if !subscribers.is_empty() => InterestSet::Only(subscribers.clone()),
            _ => InterestSet::All,
        }
    }

    pub fn targets_for(&self, subscriber_id: &str) -> Vec<String> {
        let mut targets: Vec<String> = self
            .by_target
            .read()
            .iter()
            .filter(|(_, subscribers)| subscribers.contains(subscriber_id))
            .map(|(target, _)| target.clone())
            .collect();
        targets.sort();
        targets
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.read().is_empty()
    }

    pub fn clear(&self) {
        self.by_target.write().clear();
    }
}
