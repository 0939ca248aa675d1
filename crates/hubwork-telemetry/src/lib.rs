//! Observability for Hubwork.
//!
//! - **Logging**: a `tracing-subscriber` pipeline with JSON or pretty output
//! - **Tracing**: W3C trace-context propagation and optional OTLP span export
//! - **Metrics**: request counters and latency histograms via the `metrics`
//!   facade, exported in Prometheus format
//!
//! ```text
//!   hub / server ──tracing──► EnvFilter ─► fmt (json | pretty) ─► stdout
//!        │
//!        ├──traceparent──► hub_request span ─► remote_http upstreams
//!        │                                 └► OTLP collector (optional)
//!        │
//!        └──metrics──► Prometheus recorder ─► /metrics (private listener)
//!                                          └► optional scrape listener
//! ```

#![doc(html_root_url = "https://docs.rs/hubwork-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;
pub mod tracing;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, record_request, render_metrics, InFlightGuard, MetricsConfig};
pub use self::tracing::{init_tracing, install_propagator, shutdown_tracing, TracingConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Logging, tracing and metrics settings together.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Logging settings.
    pub logging: LogConfig,
    /// Tracing settings.
    pub tracing: TracingConfig,
    /// Metrics settings.
    pub metrics: MetricsConfig,
}

/// Installs logging, then tracing, then metrics.
///
/// Must run inside a tokio runtime when span export or a metrics scrape
/// address is enabled.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_tracing(&config.tracing)?;
    init_metrics(&config.metrics)?;
    Ok(())
}
