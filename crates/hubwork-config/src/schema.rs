//! Settings section types.

use serde::{Deserialize, Serialize};

/// Listener settings.
///
/// ```
/// use hubwork_config::ServerConfig;
///
/// let config = ServerConfig {
///     public_addr: "127.0.0.1:8080".to_string(),
///     private_addr: None,
///     ..Default::default()
/// };
/// assert_eq!(config.max_body_bytes, 4 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Public listener address.
    #[serde(default = "default_public_addr")]
    pub public_addr: String,

    /// Private listener address; `None` disables the private listener.
    #[serde(default = "default_private_addr")]
    pub private_addr: Option<String>,

    /// Graceful shutdown drain timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Overall per-request deadline in seconds; 0 disables it.
    #[serde(default)]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_addr: default_public_addr(),
            private_addr: default_private_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: 0,
        }
    }
}

/// Default public port.
pub const DEFAULT_PUBLIC_PORT: u16 = 3531;

/// Default private port.
pub const DEFAULT_PRIVATE_PORT: u16 = 3532;

fn default_public_addr() -> String {
    format!("0.0.0.0:{DEFAULT_PUBLIC_PORT}")
}

#[allow(clippy::unnecessary_wraps)]
fn default_private_addr() -> Option<String> {
    Some(format!("127.0.0.1:{DEFAULT_PRIVATE_PORT}"))
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

/// Metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Standalone exporter address; `None` serves `/metrics` on the private
    /// listener only.
    #[serde(default)]
    pub addr: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines.
    #[default]
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Span export settings.
///
/// Trace-context propagation is always on; this only controls whether spans
/// leave the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TracingSettings {
    /// Export spans over OTLP.
    #[serde(default)]
    pub enabled: bool,

    /// OTLP gRPC endpoint.
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,

    /// Deployment environment attached to every span.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Fraction of new traces that are sampled.
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: default_otlp_endpoint(),
            environment: default_environment(),
            sample_ratio: default_sample_ratio(),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_sample_ratio() -> f64 {
    1.0
}

/// Telemetry section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Name reported in logs and spans.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Span export settings.
    #[serde(default)]
    pub tracing: TracingSettings,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingConfig::default(),
            tracing: TracingSettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "hubwork".to_string()
}

/// Application section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ApplicationConfig {
    /// Application name; overridden by `hub.yaml` when that names one.
    #[serde(default = "default_application_name")]
    pub name: String,

    /// Directory holding `hub.yaml`, `aggregates/` and `schemas/`.
    #[serde(default = "default_home")]
    pub home: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_application_name(),
            home: default_home(),
        }
    }
}

fn default_application_name() -> String {
    "hubwork-app".to_string()
}

fn default_home() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.public_addr, "0.0.0.0:3531");
        assert_eq!(config.private_addr.as_deref(), Some("127.0.0.1:3532"));
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.request_timeout_secs, 0);
    }

    #[test]
    fn test_server_config_partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            public_addr = "127.0.0.1:9000"
            max_body_bytes = 1024
        "#,
        )
        .unwrap();
        assert_eq!(config.public_addr, "127.0.0.1:9000");
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.private_addr.as_deref(), Some("127.0.0.1:3532"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str(r#"http_addr = "0.0.0.0:80""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_format_deserialize() {
        let format: LogFormat = serde_json::from_str(r#""pretty""#).unwrap();
        assert_eq!(format, LogFormat::Pretty);
        assert!(serde_json::from_str::<LogFormat>(r#""xml""#).is_err());
    }

    #[test]
    fn test_telemetry_defaults() {
        let config = TelemetryConfigSection::default();
        assert_eq!(config.service_name, "hubwork");
        assert_eq!(config.logging.level, "info");
        assert!(config.metrics.enabled);
        assert!(config.metrics.addr.is_none());
    }
}
