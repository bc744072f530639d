// Configuration handling for Hookwire
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, HookwireError, Result};
use crate::events::filter::{DeliveryFilter, SpatialBounds};
use crate::events::EventType;

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreConfig {
    pub bus: BusConfig,
    pub hooks: HookManagerConfig,
}

/// Event bus behaviour
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    pub enabled: bool,
    pub replay_capacity: usize,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown_ms: u64,
    pub handler_timeout_ms: Option<u64>,
    pub debounce_ms: HashMap<EventType, u64>,
    pub throttle_ms: HashMap<EventType, u64>,
    pub batch: BatchConfig,
    pub spatial_bounds: Option<SpatialBounds>,
    pub max_event_age_ms: Option<u64>,
    pub timing_sample_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replay_capacity: 1000,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown_ms: 30_000,
            handler_timeout_ms: None,
            debounce_ms: HashMap::new(),
            throttle_ms: HashMap::new(),
            batch: BatchConfig::default(),
            spatial_bounds: None,
            max_event_age_ms: None,
            timing_sample_capacity: 100,
        }
    }
}

impl BusConfig {
    pub fn with_debounce(mut self, event_type: EventType, interval: Duration) -> Self {
        self.debounce_ms
            .insert(event_type, interval.as_millis() as u64);
        self
    }

    pub fn with_throttle(mut self, event_type: EventType, interval: Duration) -> Self {
        self.throttle_ms
            .insert(event_type, interval.as_millis() as u64);
        self
    }

    pub fn with_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.circuit_breaker_threshold = threshold;
        self.circuit_breaker_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    pub fn with_replay_capacity(mut self, capacity: usize) -> Self {
        self.replay_capacity = capacity;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn circuit_breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_cooldown_ms)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }

    pub fn delivery_filter(&self) -> DeliveryFilter {
        DeliveryFilter {
            spatial_bounds: self.spatial_bounds,
            max_event_age: self.max_event_age_ms.map(Duration::from_millis),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.replay_capacity == 0 {
            return Err(invalid("bus.replay_capacity", "0", "a positive integer"));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(invalid(
                "bus.circuit_breaker_threshold",
                "0",
                "a positive integer",
            ));
        }
        if self.handler_timeout_ms == Some(0) {
            return Err(invalid("bus.handler_timeout_ms", "0", "a positive duration"));
        }
        for (event_type, ms) in &self.debounce_ms {
            if *ms == 0 {
                return Err(invalid(
                    &format!("bus.debounce_ms.{event_type}"),
                    "0",
                    "a positive interval",
                ));
            }
        }
        for (event_type, ms) in &self.throttle_ms {
            if *ms == 0 {
                return Err(invalid(
                    &format!("bus.throttle_ms.{event_type}"),
                    "0",
                    "a positive interval",
                ));
            }
        }
        self.batch.validate()?;
        if let Some(bounds) = &self.spatial_bounds {
            if !bounds.is_well_formed() {
                return Err(invalid(
                    "bus.spatial_bounds",
                    &format!("{bounds:?}"),
                    "min <= max on every axis",
                ));
            }
        }
        Ok(())
    }
}

/// Batching allow-list and flush triggers
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub event_types: Vec<EventType>,
    pub max_batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            event_types: vec![
                EventType::TimeTick,
                EventType::PositionChanged,
                EventType::ObjectUpdated,
            ],
            max_batch_size: 50,
            flush_interval_ms: 16,
        }
    }
}

impl BatchConfig {
    /// No batching at all
    pub fn disabled() -> Self {
        Self {
            event_types: Vec::new(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(invalid("bus.batch.max_batch_size", "0", "a positive integer"));
        }
        if self.flush_interval_ms == 0 {
            return Err(invalid(
                "bus.batch.flush_interval_ms",
                "0",
                "a positive interval",
            ));
        }
        Ok(())
    }
}

/// Hook manager defaults
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HookManagerConfig {
    pub default_timeout_ms: Option<u64>,
    pub default_max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub forward_to_bus: bool,
}

impl Default for HookManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            default_max_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5000,
            forward_to_bus: true,
        }
    }
}

impl HookManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_ms == Some(0) {
            return Err(invalid(
                "hooks.default_timeout_ms",
                "0",
                "a positive duration",
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(invalid(
                "hooks.retry_max_delay_ms",
                &self.retry_max_delay_ms.to_string(),
                &format!(">= retry_base_delay_ms ({})", self.retry_base_delay_ms),
            ));
        }
        Ok(())
    }
}

impl CoreConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(HookwireError::Config(Box::new(ConfigError::NotFound {
                path: path.to_path_buf(),
            })));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|err| match err {
            HookwireError::Config(config_error) => match *config_error {
                ConfigError::InvalidYaml {
                    message,
                    line,
                    column,
                    ..
                } => HookwireError::Config(Box::new(ConfigError::InvalidYaml {
                    message,
                    line,
                    column,
                    file_path: Some(path.to_path_buf()),
                })),
                other => HookwireError::Config(Box::new(other)),
            },
            other => other,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CoreConfig = if yaml.trim().is_empty() {
            CoreConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bus.validate()?;
        self.hooks.validate()
    }
}

fn invalid(field: &str, value: &str, expected: &str) -> HookwireError {
    HookwireError::Config(Box::new(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }))
}
