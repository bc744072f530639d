// Error handling framework for Hookwire
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HookwireError>;

/// Main error type for Hookwire
#[derive(Debug, Error)]
pub enum HookwireError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<ConfigError>),

    #[error("Event handler failed: {0}")]
    Handler(#[from] Box<HandlerError>),

    #[error("Hook callback failed: {0}")]
    HookCallback(#[from] Box<HookCallbackError>),

    #[error("Dependency ordering failed: {0}")]
    Dependency(#[from] Box<DependencyError>),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid YAML syntax: {message}")]
    InvalidYaml {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
        file_path: Option<PathBuf>,
    },

    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid configuration value for {field}: got {value}, expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Logging initialization failed: {message}")]
    LoggingInit { message: String },
}

/// Failures of plain bus subscribers
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler {handler_id} failed on {event_type}: {message}")]
    Failed {
        handler_id: String,
        event_type: String,
        message: String,
    },

    #[error("handler {handler_id} timed out on {event_type} after {timeout_ms}ms")]
    TimedOut {
        handler_id: String,
        event_type: String,
        timeout_ms: u64,
    },
}

/// Failures of hook callbacks
#[derive(Debug, Error)]
pub enum HookCallbackError {
    #[error("callback {callback_id} failed on hook {hook_type}: {message}")]
    Failed {
        callback_id: String,
        hook_type: String,
        message: String,
    },

    #[error("callback {callback_id} timed out on hook {hook_type} after {timeout_ms}ms")]
    TimedOut {
        callback_id: String,
        hook_type: String,
        timeout_ms: u64,
    },

    #[error("hook {hook_type} aborted in {phase} phase by callback {callback_id}: {message}")]
    Aborted {
        callback_id: String,
        hook_type: String,
        phase: String,
        message: String,
    },

    #[error("callback id already registered: {callback_id}")]
    DuplicateId { callback_id: String },

    #[error("fallback for callback {callback_id} failed: {message}")]
    FallbackFailed {
        callback_id: String,
        message: String,
    },
}

/// Dependency graph errors
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("dependency cycle in {phase} phase of hook {hook_type}: {}", .cycle.join(" -> "))]
    Cycle {
        hook_type: String,
        phase: String,
        cycle: Vec<String>,
    },
}

/// Coarse classification of failures for logging and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    HandlerFailure,
    HookCallbackFailure,
    TimeoutFailure,
    CycleError,
    Configuration,
    Io,
}

impl HookwireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HookwireError::Config(_) => ErrorKind::Configuration,
            HookwireError::Handler(err) => match err.as_ref() {
                HandlerError::TimedOut { .. } => ErrorKind::TimeoutFailure,
                HandlerError::Failed { .. } => ErrorKind::HandlerFailure,
            },
            HookwireError::HookCallback(err) => match err.as_ref() {
                HookCallbackError::TimedOut { .. } => ErrorKind::TimeoutFailure,
                HookCallbackError::DuplicateId { .. } => ErrorKind::Configuration,
                _ => ErrorKind::HookCallbackFailure,
            },
            HookwireError::Dependency(_) => ErrorKind::CycleError,
            HookwireError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::TimeoutFailure
    }
}

// Conversion from serde_yaml::Error to ConfigError
impl From<serde_yaml::Error> for Box<ConfigError> {
    fn from(error: serde_yaml::Error) -> Self {
        let location = error.location();
        Box::new(ConfigError::InvalidYaml {
            message: error.to_string(),
            line: location.as_ref().map(|l| l.line() as u32),
            column: location.as_ref().map(|l| l.column() as u32),
            file_path: None,
        })
    }
}

impl From<serde_yaml::Error> for HookwireError {
    fn from(error: serde_yaml::Error) -> Self {
        HookwireError::Config(Box::<ConfigError>::from(error))
    }
}
