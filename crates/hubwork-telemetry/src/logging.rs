//! Structured logging.
//!
//! One global `tracing` subscriber: an `EnvFilter` (the `RUST_LOG` variable
//! wins over the configured level) feeding a JSON or pretty formatter.
//!
//! ```rust,ignore
//! use hubwork_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(api = "shop", service = "orders", "hub ready");
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Default filter directive (e.g. "info", "hubwork_core=debug").
    pub level: String,

    /// JSON lines instead of human-readable output.
    pub json_format: bool,

    /// Emit span open/close events.
    pub span_events: bool,

    /// Include file and line.
    pub file_line_info: bool,

    /// Include thread IDs.
    pub thread_ids: bool,

    /// Include the module path.
    pub include_target: bool,

    /// Name attached to the startup log line.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Human-readable debug output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            thread_ids: false,
            include_target: true,
            service_name: "hubwork".to_string(),
        }
    }

    /// JSON lines at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
            service_name: "hubwork".to_string(),
        }
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }
}

/// Installs the global subscriber.
///
/// Fails if the filter is invalid or a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => create_env_filter(&config.level)?,
    };

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::debug!(service = %config.service_name, level = %config.level, "logging initialized");
    Ok(())
}

/// Parses a filter directive.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

/// Field names shared by every crate's log lines.
pub mod fields {
    /// Request identity.
    pub const REQUEST_ID: &str = "request_id";

    /// API name (first routing segment).
    pub const API: &str = "api";

    /// Service name (second routing segment).
    pub const SERVICE: &str = "service";

    /// HTTP method.
    pub const METHOD: &str = "method";

    /// Response status.
    pub const STATUS: &str = "status";

    /// Error text.
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let dev = LogConfig::development();
        assert!(!dev.json_format);
        assert!(dev.span_events);
        assert_eq!(dev.level, "debug");

        let prod = LogConfig::default();
        assert!(prod.json_format);
        assert!(!prod.file_line_info);
        assert_eq!(prod.level, "info");
    }

    #[test]
    fn test_builders() {
        let config = LogConfig::production()
            .with_level("warn")
            .with_service_name("recipes");
        assert_eq!(config.level, "warn");
        assert_eq!(config.service_name, "recipes");
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info,hubwork_core=trace").is_ok());
        assert!(create_env_filter("hubwork_core=bogus").is_err());
    }

    #[test]
    fn test_disabled_logging_is_noop() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
