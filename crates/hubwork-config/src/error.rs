//! Configuration error types.

use std::path::PathBuf;

use hubwork_core::HubError;
use thiserror::Error;

/// Errors raised while loading settings or compiling a hub definition.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read a configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A declarative document could not be decoded.
    #[error("failed to parse {path}: {reason}")]
    DocumentError {
        /// Offending file.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },

    /// Validation error after loading.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    /// An aggregate could not be turned into a service.
    #[error("failed to configure aggregate {aggregate}{}: {source}", handler_suffix(.handler.as_deref()))]
    Aggregate {
        /// Aggregate (service) name.
        aggregate: String,
        /// Handler position and methods, when the failure is inside one.
        handler: Option<String>,
        /// Underlying engine error.
        #[source]
        source: HubError,
    },
}

fn handler_suffix(handler: Option<&str>) -> String {
    handler.map(|h| format!(" (handler {h})")).unwrap_or_default()
}

impl ConfigError {
    /// Create a new file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a new document decoding error.
    pub fn document_error(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DocumentError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Create a new validation error.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Create an aggregate-level compilation error.
    pub fn aggregate(aggregate: impl Into<String>, source: HubError) -> Self {
        Self::Aggregate {
            aggregate: aggregate.into(),
            handler: None,
            source,
        }
    }

    /// Create a handler-level compilation error.
    pub fn handler(
        aggregate: impl Into<String>,
        handler: impl Into<String>,
        source: HubError,
    ) -> Self {
        Self::Aggregate {
            aggregate: aggregate.into(),
            handler: Some(handler.into()),
            source,
        }
    }
}
