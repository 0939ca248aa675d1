//! Layered settings loader.
//!
//! Layers, later ones winning: built-in defaults, a TOML or JSON file, then
//! `PREFIX__SECTION__KEY` environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, HubworkConfig, LogFormat};

/// Default environment prefix.
pub const ENV_PREFIX: &str = "HUBWORK";

/// Loads [`HubworkConfig`] from defaults, a file and the environment.
///
/// ```no_run
/// use hubwork_config::ConfigLoader;
///
/// # fn main() -> Result<(), hubwork_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("hubwork.toml")?
///     .with_env_prefix("HUBWORK")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HubworkConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader seeded with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HubworkConfig::default(),
            env_prefix: None,
        }
    }

    /// Seed with an explicit configuration instead of the defaults.
    #[must_use]
    pub fn with_base(mut self, config: HubworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed with the development preset.
    ///
    /// ```
    /// use hubwork_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HubworkConfig::development();
        self
    }

    /// Seed with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = HubworkConfig::production();
        self
    }

    /// Load a `.toml` or `.json` file, chosen by extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config = parse(&content, &extension).map_err(|err| match err {
            ConfigError::ValidationError(_) => ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            )),
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is not an error.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration text in the given format (`toml` or `json`).
    ///
    /// ```
    /// use hubwork_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\npublic_addr = \"127.0.0.1:4000\"\n", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.server.public_addr, "127.0.0.1:4000");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Enable environment overrides under `prefix`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file in the working directory, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        self
    }

    /// Apply environment overrides and validate.
    pub fn load(mut self) -> Result<HubworkConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: HashMap<String, String> = env::vars()
                .filter(|(key, _)| key.starts_with(&prefix))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finish without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HubworkConfig {
        self.config
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;
        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "PUBLIC_ADDR"] => config.server.public_addr = value.to_string(),
            ["SERVER", "PRIVATE_ADDR"] => config.server.private_addr = optional(value),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_int(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse_int(key, value)?,
            ["SERVER", "REQUEST_TIMEOUT_SECS"] => {
                config.server.request_timeout_secs = parse_int(key, value)?;
            }

            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => config.telemetry.metrics.addr = optional(value),
            ["TELEMETRY", "TRACING", "ENABLED"] => {
                config.telemetry.tracing.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "TRACING", "OTLP_ENDPOINT"] => {
                config.telemetry.tracing.otlp_endpoint = value.to_string();
            }
            ["TELEMETRY", "TRACING", "ENVIRONMENT"] => {
                config.telemetry.tracing.environment = value.to_string();
            }
            ["TELEMETRY", "TRACING", "SAMPLE_RATIO"] => {
                config.telemetry.tracing.sample_ratio = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected number"))?;
            }

            ["APPLICATION", "NAME"] => config.application.name = value.to_string(),
            ["APPLICATION", "HOME"] => config.application.home = value.to_string(),

            _ => tracing::debug!(var = key, "ignoring unknown configuration variable"),
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<HubworkConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        _ => Err(ConfigError::validation_error(format!(
            "unsupported configuration format: {format}"
        ))),
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

// Empty or "none" clears an optional address.
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
