// Event-level delivery predicates and replay filtering
use crate::events::{Event, EventType, Position};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Axis-aligned region; positional events outside it are not delivered
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialBounds {
    pub min: Position,
    pub max: Position,
}

impl SpatialBounds {
    pub fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, position: &Position) -> bool {
        (self.min.x..=self.max.x).contains(&position.x)
            && (self.min.y..=self.max.y).contains(&position.y)
            && (self.min.z..=self.max.z).contains(&position.z)
    }

    pub fn is_well_formed(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }
}

/// Why an event was rejected before reaching any handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutOfBounds,
    Stale,
}

/// Spatial then temporal predicate applied ahead of per-handler filtering
#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub spatial_bounds: Option<SpatialBounds>,
    pub max_event_age: Option<Duration>,
}

impl DeliveryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spatial_bounds(mut self, bounds: SpatialBounds) -> Self {
        self.spatial_bounds = Some(bounds);
        self
    }

    pub fn with_max_event_age(mut self, max_age: Duration) -> Self {
        self.max_event_age = Some(max_age);
        self
    }

    /// Events without a position pass the spatial check; events without a timestamp pass the age check
    pub fn check(&self, event: &Event, now: DateTime<Utc>) -> Result<(), Rejection> {
        if let (Some(bounds), Some(position)) = (&self.spatial_bounds, event.payload.position()) {
            if !bounds.contains(&position) {
                return Err(Rejection::OutOfBounds);
            }
        }

        if let (Some(max_age), Some(timestamp)) = (self.max_event_age, event.timestamp) {
            let age = now.signed_duration_since(timestamp);
            if age.to_std().is_ok_and(|age| age > max_age) {
                return Err(Rejection::Stale);
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.spatial_bounds.is_none() && self.max_event_age.is_none()
    }
}

/// Selects events from the replay buffer
#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    pub event_types: HashSet<EventType>,
    pub target_id: Option<String>,
    pub target_pattern: Option<Regex>,
    pub since: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` matches
    pub limit: Option<usize>,
}

impl ReplayFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, event_types: Vec<EventType>) -> Self {
        self.event_types = event_types.into_iter().collect();
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_target_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.target_pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }

        if let Some(target_id) = &self.target_id {
            if event.target() != Some(target_id.as_str()) {
                return false;
            }
        }

        if let Some(pattern) = &self.target_pattern {
            match event.target() {
                Some(target) if pattern.is_match(target) => {}
                _ => return false,
            }
        }

        if let Some(since) = self.since {
            match event.timestamp {
                Some(timestamp) if timestamp >= since => {}
                _ => return false,
            }
        }

        true
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.event_types.is_empty() {
            let mut names: Vec<String> = self.event_types.iter().map(|t| t.to_string()).collect();
            names.sort();
            parts.push(format!("event_types: {names:?}"));
        }
        if let Some(target_id) = &self.target_id {
            parts.push(format!("target: {target_id}"));
        }
        if let Some(pattern) = &self.target_pattern {
            parts.push(format!("target_pattern: {}", pattern.as_str()));
        }
        if let Some(since) = self.since {
            parts.push(format!("since: {}", since.to_rfc3339()));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit: {limit}"));
        }

        if parts.is_empty() {
            "no filters".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Payload;

    fn positioned(x: f64) -> Event {
        Event::new(EventType::PositionChanged, "test").with_payload(Payload::Position {
            position: Position::new(x, 0.0, 0.0),
            previous: None,
        })
    }

    #[test]
    fn test_spatial_bounds() {
        let filter = DeliveryFilter::new().with_spatial_bounds(SpatialBounds::new(
            Position::new(-10.0, -10.0, -10.0),
            Position::new(10.0, 10.0, 10.0),
        ));
        let now = Utc::now();

        assert_eq!(filter.check(&positioned(5.0), now), Ok(()));
        assert_eq!(
            filter.check(&positioned(50.0), now),
            Err(Rejection::OutOfBounds)
        );
        // Non-positional events are not spatially scoped
        assert_eq!(
            filter.check(&Event::new(EventType::TimeTick, "test"), now),
            Ok(())
        );
    }

    #[test]
    fn test_max_event_age() {
        let filter = DeliveryFilter::new().with_max_event_age(Duration::from_secs(5));
        let now = Utc::now();
        let fresh = Event::new(EventType::Interaction, "t").with_timestamp(now);
        let stale = Event::new(EventType::Interaction, "t")
            .with_timestamp(now - chrono::Duration::seconds(60));

        assert_eq!(filter.check(&fresh, now), Ok(()));
        assert_eq!(filter.check(&stale, now), Err(Rejection::Stale));
    }

    #[test]
    fn test_inverted_bounds_not_well_formed() {
        let bounds = SpatialBounds::new(Position::new(1.0, 0.0, 0.0), Position::new(0.0, 1.0, 1.0));
        assert!(!bounds.is_well_formed());
    }

    #[test]
    fn test_replay_filter_by_type_and_target() {
        let filter = ReplayFilter::new()
            .with_event_types(vec![EventType::ObjectLoaded])
            .with_target("tavern");

        assert!(filter.matches(&Event::new(EventType::ObjectLoaded, "s").with_target("tavern")));
        assert!(!filter.matches(&Event::new(EventType::ObjectLoaded, "s").with_target("forge")));
        assert!(!filter.matches(&Event::new(EventType::ObjectUnloaded, "s").with_target("tavern")));
    }

    #[test]
    fn test_replay_filter_pattern() {
        let filter = ReplayFilter::new().with_target_pattern("^npc-").unwrap();
        assert!(filter.matches(&Event::new(EventType::Interaction, "s").with_target("npc-12")));
        assert!(!filter.matches(&Event::new(EventType::Interaction, "s").with_target("door-1")));
        assert!(!filter.matches(&Event::new(EventType::Interaction, "s")));
    }

    #[test]
    fn test_replay_filter_invalid_pattern() {
        assert!(ReplayFilter::new().with_target_pattern("[invalid").is_err());
    }

    #[test]
    fn test_replay_filter_summary() {
        let filter = ReplayFilter::new()
            .with_event_types(vec![EventType::TimeTick])
            .with_limit(10);
        let summary = filter.summary();
        assert!(summary.contains("time_tick"));
        assert!(summary.contains("limit: 10"));
        assert_eq!(ReplayFilter::new().summary(), "no filters");
    }
}
