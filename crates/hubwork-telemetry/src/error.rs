//! Telemetry error types.

use thiserror::Error;

/// Errors raised while installing logging or metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize metrics.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to initialize tracing.
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Failed to parse address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
