//! Request metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `hubwork_requests_total` | Counter | `api`, `service`, `method`, `status` |
//! | `hubwork_request_duration_seconds` | Histogram | `api`, `service`, `method` |
//! | `hubwork_in_flight_requests` | Gauge | - |
//!
//! Recording works whether or not a recorder is installed; without one the
//! calls are no-ops.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Counter of finished requests.
pub const REQUESTS_TOTAL: &str = "hubwork_requests_total";
/// Latency histogram.
pub const REQUEST_DURATION: &str = "hubwork_request_duration_seconds";
/// Requests currently being dispatched.
pub const IN_FLIGHT: &str = "hubwork_in_flight_requests";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder.
    pub enabled: bool,

    /// Standalone scrape address; `None` leaves rendering to the caller.
    pub addr: Option<String>,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: None,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// With an `addr`, a scrape listener is spawned on the current tokio
/// runtime. Calling this twice fails.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = if let Some(addr) = &config.addr {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;
        builder = builder.with_http_listener(addr);

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| {
            TelemetryError::MetricsInit("a metrics recorder is already installed".to_string())
        })?;
        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::warn!(error = ?e, "metrics exporter stopped");
            }
        });
        tracing::info!(%addr, "metrics exporter listening");
        handle
    } else {
        builder
            .install_recorder()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
    };

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();
    Ok(())
}

/// Renders metrics in Prometheus text format, if a recorder is installed.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of requests dispatched by the hub");
    describe_histogram!(REQUEST_DURATION, "Request dispatch duration in seconds");
    describe_gauge!(IN_FLIGHT, "Number of requests currently being dispatched");
}

/// Records one finished request.
pub fn record_request(api: &str, service: &str, method: &str, status: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "api" => api.to_string(),
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION,
        "api" => api.to_string(),
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Holds one unit of the in-flight gauge until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT).decrement(1.0);
    }
}
