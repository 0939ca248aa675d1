//! Top-level settings.
//!
//! This module provides [`HubworkConfig`] and its builder.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{ApplicationConfig, ConfigError, LogFormat, ServerConfig, TelemetryConfigSection};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Process-level settings for a Hubwork application.
///
/// Loaded by [`ConfigLoader`](crate::ConfigLoader). Routing itself comes from
/// the declarative files under `application.home`, not from here.
///
/// ```
/// use hubwork_config::HubworkConfig;
///
/// let config = HubworkConfig::default();
/// assert_eq!(config.server.public_addr, "0.0.0.0:3531");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct HubworkConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging, tracing and metrics.
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,

    /// Application identity and home directory.
    #[serde(default)]
    pub application: ApplicationConfig,
}

impl HubworkConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> HubworkConfigBuilder {
        HubworkConfigBuilder::new()
    }

    /// Check addresses, names and the log level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_addr("server.public_addr", &self.server.public_addr)?;
        if let Some(addr) = &self.server.private_addr {
            parse_addr("server.private_addr", addr)?;
        }
        if let Some(addr) = &self.telemetry.metrics.addr {
            parse_addr("telemetry.metrics.addr", addr)?;
        }

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }
        if self.application.name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "application.name",
                "must not be empty",
            ));
        }
        if self.telemetry.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.service_name",
                "must not be empty",
            ));
        }

        let tracing = &self.telemetry.tracing;
        if !(0.0..=1.0).contains(&tracing.sample_ratio) {
            return Err(ConfigError::invalid_value(
                "telemetry.tracing.sample_ratio",
                format!("{} is outside 0.0..=1.0", tracing.sample_ratio),
            ));
        }
        if tracing.enabled && tracing.otlp_endpoint.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.tracing.otlp_endpoint",
                "must not be empty when span export is enabled",
            ));
        }

        let level = self.telemetry.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                format!("unknown level '{}'", self.telemetry.logging.level),
            ));
        }

        Ok(())
    }

    /// Debug logging in human-readable form.
    ///
    /// ```
    /// use hubwork_config::{HubworkConfig, LogFormat};
    ///
    /// let config = HubworkConfig::development();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.server.public_addr = "127.0.0.1:3531".to_string();
        config
    }

    /// Info-level JSON logging.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid_value(field, format!("invalid socket address: {value}")))
}

/// Builder for [`HubworkConfig`].
#[derive(Debug, Default)]
pub struct HubworkConfigBuilder {
    server: Option<ServerConfig>,
    telemetry: Option<TelemetryConfigSection>,
    application: Option<ApplicationConfig>,
}

impl HubworkConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the application section.
    #[must_use]
    pub fn application(mut self, application: ApplicationConfig) -> Self {
        self.application = Some(application);
        self
    }

    /// Build; unset sections use defaults.
    #[must_use]
    pub fn build(self) -> HubworkConfig {
        HubworkConfig {
            server: self.server.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
            application: self.application.unwrap_or_default(),
        }
    }

    /// Build and validate.
    pub fn build_validated(self) -> Result<HubworkConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
