// Logging setup for hosts embedding Hookwire
use std::io::{self, IsTerminal};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ConfigError, HookwireError, Result};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format (pretty for terminals, json for log shipping)
    pub format: LogFormat,
    /// Color output configuration
    pub color: ColorConfig,
    /// Whether to show targets (module names)
    pub show_targets: bool,
}

/// Log output format options
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// Color output configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ColorConfig {
    /// Automatically detect if colors should be used
    Auto,
    Always,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            color: ColorConfig::Auto,
            show_targets: false,
        }
    }
}

impl LogConfig {
    /// Pick a level from verbosity flags; `quiet` wins over `verbose`
    pub fn from_verbosity(verbose: bool, quiet: bool) -> Self {
        let level = if quiet {
            Level::ERROR
        } else if verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            level,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Check if colors should be used based on configuration and terminal
    pub fn should_use_colors(&self) -> bool {
        match self.color {
            ColorConfig::Always => true,
            ColorConfig::Never => false,
            ColorConfig::Auto => {
                io::stderr().is_terminal()
                    && std::env::var("TERM").map_or(true, |term| term != "dumb")
                    && std::env::var("NO_COLOR").is_err()
            }
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("hookwire={}", self.level)))
    }
}

/// Install a global subscriber. Fails if one is already installed.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = config.env_filter();
    let ansi = config.should_use_colors();

    let installed = match config.format {
        LogFormat::Pretty => fmt()
            .with_env_filter(env_filter)
            .with_target(config.show_targets)
            .with_ansi(ansi)
            .try_init(),
        LogFormat::Json => fmt().with_env_filter(env_filter).json().try_init(),
        LogFormat::Compact => fmt()
            .with_env_filter(env_filter)
            .compact()
            .with_target(config.show_targets)
            .with_ansi(ansi)
            .try_init(),
    };

    installed.map_err(|err| {
        HookwireError::Config(Box::new(ConfigError::LoggingInit {
            message: err.to_string(),
        }))
    })
}

/// Logging utilities for common operations
pub mod utils {
    use crate::error::HookwireError;
    use crate::events::{Event, EventType, HookType};
    use std::path::Path;
    use tracing::{debug, error, span, warn, Level, Span};

    /// Span covering one publish call
    pub fn publish_span(event_type: &EventType, target_id: Option<&str>) -> Span {
        span!(
            Level::DEBUG,
            "publish",
            event_type = %event_type,
            target_id = target_id
        )
    }

    /// Span covering one `execute_hook` pass
    pub fn hook_execution_span(hook_type: &HookType, target_id: &str, execution_id: &str) -> Span {
        span!(
            Level::INFO,
            "hook_execution",
            hook_type = %hook_type,
            target_id = %target_id,
            execution_id = %execution_id
        )
    }

    pub fn config_loading_span(config_path: &Path) -> Span {
        span!(Level::DEBUG, "config_loading", path = %config_path.display())
    }

    /// Bus handler failures never propagate to the publisher; this is their record
    pub fn log_handler_failure(handler_id: &str, event: &Event, error: &HookwireError) {
        warn!(
            handler_id = %handler_id,
            event_type = %event.event_type,
            target_id = event.target().unwrap_or("-"),
            source = %event.source,
            error = %error,
            "Event handler failed"
        );
    }

    /// Log hook callback completion
    pub fn log_callback_outcome(
        callback_id: &str,
        phase: &str,
        success: bool,
        duration_ms: u128,
    ) {
        if success {
            debug!(
                callback_id = %callback_id,
                phase = %phase,
                duration_ms = duration_ms,
                "Hook callback completed"
            );
        } else {
            error!(
                callback_id = %callback_id,
                phase = %phase,
                duration_ms = duration_ms,
                "Hook callback failed"
            );
        }
    }

    /// Log configuration validation
    pub fn log_config_validation(config_path: &Path, valid: bool) {
        if valid {
            debug!(path = %config_path.display(), "Configuration validation passed");
        } else {
            error!(path = %config_path.display(), "Configuration validation failed");
        }
    }
}
