// Event types carried by the bus
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Named lifecycle points that hook callbacks attach to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HookType {
    SceneLoad,
    SceneUnload,
    ObjectLoad,
    ObjectUnload,
    ObjectActivate,
    ObjectDeactivate,
    ObjectUpdate,
    /// Application-defined hook. A built-in name here does not survive the
    /// string form; build it with [`HookType::custom`] instead.
    Custom(String),
}

impl HookType {
    /// Named hook; a built-in name resolves to its built-in variant
    pub fn custom(name: impl Into<String>) -> Self {
        let name: String = name.into();
        HookType::from(name)
    }

    pub fn as_str(&self) -> &str {
        match self {
            HookType::SceneLoad => "scene_load",
            HookType::SceneUnload => "scene_unload",
            HookType::ObjectLoad => "object_load",
            HookType::ObjectUnload => "object_unload",
            HookType::ObjectActivate => "object_activate",
            HookType::ObjectDeactivate => "object_deactivate",
            HookType::ObjectUpdate => "object_update",
            HookType::Custom(name) => name,
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "scene_load" => HookType::SceneLoad,
            "scene_unload" => HookType::SceneUnload,
            "object_load" => HookType::ObjectLoad,
            "object_unload" => HookType::ObjectUnload,
            "object_activate" => HookType::ObjectActivate,
            "object_deactivate" => HookType::ObjectDeactivate,
            "object_update" => HookType::ObjectUpdate,
            other => HookType::Custom(other.to_string()),
        })
    }
}

impl From<String> for HookType {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(hook_type) => hook_type,
            Err(never) => match never {},
        }
    }
}

impl From<HookType> for String {
    fn from(value: HookType) -> Self {
        value.to_string()
    }
}

/// Event type used for subscription routing and shaping configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    ObjectLoaded,
    ObjectUnloaded,
    ObjectUpdated,
    StateChanged,
    PositionChanged,
    Interaction,
    TimeTick,
    /// Forwarded occurrence of a hook execution
    Hook(HookType),
    /// Application-defined type. A built-in name or a `hook:` prefix here
    /// does not survive the string form; build it with [`EventType::custom`].
    Custom(String),
}

const HOOK_PREFIX: &str = "hook:";

impl EventType {
    /// Named event type. Built-in names and `hook:` names resolve to their
    /// own variants, so the result always round-trips through its string form.
    pub fn custom(name: impl Into<String>) -> Self {
        let name: String = name.into();
        EventType::from(name)
    }

    /// True for values that parse back to themselves
    pub fn is_canonical(&self) -> bool {
        match self {
            EventType::Custom(name) => matches!(
                name.parse::<EventType>(),
                Ok(EventType::Custom(_))
            ),
            EventType::Hook(HookType::Custom(name)) => matches!(
                name.parse::<HookType>(),
                Ok(HookType::Custom(_))
            ),
            _ => true,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::ObjectLoaded => f.write_str("object_loaded"),
            EventType::ObjectUnloaded => f.write_str("object_unloaded"),
            EventType::ObjectUpdated => f.write_str("object_updated"),
            EventType::StateChanged => f.write_str("state_changed"),
            EventType::PositionChanged => f.write_str("position_changed"),
            EventType::Interaction => f.write_str("interaction"),
            EventType::TimeTick => f.write_str("time_tick"),
            EventType::Hook(hook_type) => write!(f, "{HOOK_PREFIX}{hook_type}"),
            EventType::Custom(name) => f.write_str(name),
        }
    }
}

impl FromStr for EventType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "object_loaded" => EventType::ObjectLoaded,
            "object_unloaded" => EventType::ObjectUnloaded,
            "object_updated" => EventType::ObjectUpdated,
            "state_changed" => EventType::StateChanged,
            "position_changed" => EventType::PositionChanged,
            "interaction" => EventType::Interaction,
            "time_tick" => EventType::TimeTick,
            other => match other.strip_prefix(HOOK_PREFIX) {
                Some(hook) => EventType::Hook(HookType::from(hook.to_string())),
                None => EventType::Custom(other.to_string()),
            },
        })
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(event_type) => event_type,
            Err(never) => match never {},
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

impl From<HookType> for EventType {
    fn from(value: HookType) -> Self {
        EventType::Hook(value)
    }
}

/// World-space position carried by spatial payloads
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Closed set of payload shapes delivered to handlers and hook callbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    #[default]
    Empty,
    Lifecycle {
        object_type: String,
        state: String,
    },
    Position {
        position: Position,
        previous: Option<Position>,
    },
    StateChange {
        key: String,
        previous: Option<serde_json::Value>,
        current: serde_json::Value,
    },
    Interaction {
        actor_id: String,
        action: String,
    },
    Tick {
        tick: u64,
        delta_ms: u64,
    },
    Custom {
        data: serde_json::Value,
    },
}

impl Payload {
    pub fn position(&self) -> Option<Position> {
        match self {
            Payload::Position { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// A single occurrence published on the bus
///
/// Events are read-only once published; the bus shares them behind `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub target_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub source: String,
    pub payload: Payload,
}

impl Event {
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        Self {
            event_type,
            target_id: None,
            timestamp: None,
            source: source.into(),
            payload: Payload::Empty,
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fill in the timestamp if the emitter left it empty
    pub fn stamped(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        self
    }

    pub fn target(&self) -> Option<&str> {
        self.target_id.as_deref()
    }
}
