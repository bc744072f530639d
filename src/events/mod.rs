// Event bus: typed events, prioritized handlers, traffic shaping and replay

pub mod breaker;
pub mod bus;
pub mod event;
pub mod filter;
pub mod handler;
pub mod metrics;
pub mod replay;
pub mod shaping;

// Re-export main types for easier access
pub use breaker::{CircuitState, RetryPolicy};
pub use bus::EventBus;
pub use event::{Event, EventType, HookType, Payload, Position};
pub use filter::{DeliveryFilter, ReplayFilter, SpatialBounds};
pub use handler::{
    handler_fn, EventHandler, HandlerFilter, LoggingEventHandler, Priority, SubscribeOptions,
    SubscriptionHandle,
};
pub use metrics::{BusMetrics, HandlerTiming};
