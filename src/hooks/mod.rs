// Lifecycle hooks: phased, prioritized, dependency-ordered callbacks on top of the bus

pub mod callback;
pub mod dependency;
pub mod manager;
pub mod report;

pub use callback::{
    callback_fn, fallback_fn, ErrorStrategy, HookCallback, HookContext, HookFallback, HookOptions,
    HookPhase,
};
pub use dependency::DependencyGraph;
pub use manager::HookManager;
pub use report::{CallbackOutcome, CallbackStatus, ExecutionReport, HookStats, PhaseError};
