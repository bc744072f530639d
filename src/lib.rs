// Hookwire - in-process event bus and lifecycle hook manager
// This file contains the core library functionality

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod hooks;
pub mod interest;
pub mod logging;

// Re-export main types for easier access
pub use config::{BatchConfig, BusConfig, CoreConfig, HookManagerConfig};
pub use context::CoreContext;
pub use error::{
    ConfigError, DependencyError, ErrorKind, HandlerError, HookCallbackError, HookwireError,
    Result,
};
pub use events::{
    handler_fn, BusMetrics, CircuitState, DeliveryFilter, Event, EventBus, EventHandler,
    EventType, HookType, LoggingEventHandler, Payload, Position, Priority, ReplayFilter,
    RetryPolicy, SpatialBounds, SubscribeOptions, SubscriptionHandle,
};
pub use hooks::{
    callback_fn, fallback_fn, CallbackOutcome, CallbackStatus, ErrorStrategy, ExecutionReport,
    HookCallback, HookContext, HookFallback, HookManager, HookOptions, HookPhase, HookStats,
    PhaseError,
};
pub use interest::{InterestRegistry, InterestSet};
pub use logging::{init_logging, LogConfig, LogFormat};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
