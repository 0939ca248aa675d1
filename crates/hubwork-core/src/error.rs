//! Error types for Hubwork.
//!
//! [`HubError`] is the single error type flowing through routing, workflow
//! execution and plugin resolution. Errors raised by tasks and targets are
//! carried opaquely in [`HubError::Plugin`] and are never rewritten on their
//! way back to the hub.
//!
//! | `ErrorKind` | Status |
//! |---|---|
//! | `UnsupportedMethod` | 405 |
//! | `NotFound` | 404 |
//! | `BadRequest` | 400 |
//! | `Cancelled` | 504 |
//! | `Configuration` | 500 |
//! | `Contract` | 500 |
//! | `Plugin` | 500 |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::method::HttpMethod;

/// Boxed error used by plugins for their own failure types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using [`HubError`].
pub type HubResult<T> = Result<T, HubError>;

/// Coarse classification of a [`HubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The inbound method is outside the supported set.
    UnsupportedMethod,
    /// No service is registered for the routing key.
    NotFound,
    /// The inbound request could not be read.
    BadRequest,
    /// The execution context was cancelled or its deadline passed.
    Cancelled,
    /// A service, handler or plugin is misconfigured.
    Configuration,
    /// A target broke its contract.
    Contract,
    /// A task or target failed.
    Plugin,
}

impl ErrorKind {
    /// Returns the HTTP status code conventionally used for this kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedMethod => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            Self::Configuration | Self::Contract | Self::Plugin => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Errors produced while routing and dispatching a request.
///
/// # Example
///
/// ```
/// use hubwork_core::{ErrorKind, HubError};
///
/// let err = HubError::service_not_found("orders", "invoice");
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.to_string(), "no such service found: orders/invoice");
/// ```
#[derive(Error, Debug)]
pub enum HubError {
    /// Inbound method is not one of the supported HTTP methods.
    #[error("unsupported HTTP method: {method}")]
    UnsupportedMethod {
        /// The rejected method token.
        method: String,
    },

    /// No service registered under the derived routing key.
    #[error("no such service found: {api}/{service}")]
    ServiceNotFound {
        /// API name taken from the path.
        api: String,
        /// Service name taken from the path.
        service: String,
    },

    /// The service exists but has no handler for the method.
    #[error("method {method} is not configured for service {service}")]
    MethodNotConfigured {
        /// The request method.
        method: HttpMethod,
        /// Name of the service.
        service: String,
    },

    /// The handler has no target bound.
    #[error("no target configured for service {service}")]
    TargetNotConfigured {
        /// Name of the service.
        service: String,
    },

    /// The target reported success without producing a response.
    #[error("unexpected empty response from target of service {service}")]
    EmptyResponse {
        /// Name of the service.
        service: String,
    },

    /// A configured step names a task type nobody registered.
    #[error("workflow task not registered: {name}")]
    TaskNotRegistered {
        /// The task type name.
        name: String,
    },

    /// A configured target names a target type nobody registered.
    #[error("workflow target not registered: {name}")]
    TargetNotRegistered {
        /// The target type name.
        name: String,
    },

    /// A plugin factory rejected its configuration value.
    #[error("invalid configuration for {plugin}: {reason}")]
    InvalidPluginConfig {
        /// The plugin type name.
        plugin: String,
        /// What was wrong with the value.
        reason: String,
    },

    /// The inbound body could not be read.
    #[error("failed to read request body: {message}")]
    BodyRead {
        /// Human-readable error message.
        message: String,
    },

    /// The execution context was cancelled before the work finished.
    #[error("request cancelled: {message}")]
    Cancelled {
        /// Human-readable error message.
        message: String,
    },

    /// Failure raised by a task or target.
    #[error("{source}")]
    Plugin {
        /// The plugin's own error.
        #[source]
        source: BoxError,
    },
}

impl HubError {
    /// Creates an unsupported method error.
    #[must_use]
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Creates a service not found error.
    #[must_use]
    pub fn service_not_found(api: impl Into<String>, service: impl Into<String>) -> Self {
        Self::ServiceNotFound {
            api: api.into(),
            service: service.into(),
        }
    }

    /// Creates a method not configured error.
    #[must_use]
    pub fn method_not_configured(method: HttpMethod, service: impl Into<String>) -> Self {
        Self::MethodNotConfigured {
            method,
            service: service.into(),
        }
    }

    /// Creates a target not configured error.
    #[must_use]
    pub fn target_not_configured(service: impl Into<String>) -> Self {
        Self::TargetNotConfigured {
            service: service.into(),
        }
    }

    /// Creates an empty response error.
    #[must_use]
    pub fn empty_response(service: impl Into<String>) -> Self {
        Self::EmptyResponse {
            service: service.into(),
        }
    }

    /// Creates a task not registered error.
    #[must_use]
    pub fn task_not_registered(name: impl Into<String>) -> Self {
        Self::TaskNotRegistered { name: name.into() }
    }

    /// Creates a target not registered error.
    #[must_use]
    pub fn target_not_registered(name: impl Into<String>) -> Self {
        Self::TargetNotRegistered { name: name.into() }
    }

    /// Creates an invalid plugin configuration error.
    #[must_use]
    pub fn invalid_plugin_config(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPluginConfig {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// Creates a body read error.
    #[must_use]
    pub fn body_read(message: impl Into<String>) -> Self {
        Self::BodyRead {
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Wraps a task or target failure.
    ///
    /// Plain strings work too: `HubError::plugin("upstream refused")`.
    pub fn plugin(source: impl Into<BoxError>) -> Self {
        Self::Plugin {
            source: source.into(),
        }
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedMethod { .. } => ErrorKind::UnsupportedMethod,
            Self::ServiceNotFound { .. } => ErrorKind::NotFound,
            Self::BodyRead { .. } => ErrorKind::BadRequest,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::MethodNotConfigured { .. }
            | Self::TargetNotConfigured { .. }
            | Self::TaskNotRegistered { .. }
            | Self::TargetNotRegistered { .. }
            | Self::InvalidPluginConfig { .. } => ErrorKind::Configuration,
            Self::EmptyResponse { .. } => ErrorKind::Contract,
            Self::Plugin { .. } => ErrorKind::Plugin,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Returns true for errors raised by plugin lookup (`TaskNotRegistered`
    /// and `TargetNotRegistered`).
    #[must_use]
    pub const fn is_not_registered(&self) -> bool {
        matches!(
            self,
            Self::TaskNotRegistered { .. } | Self::TargetNotRegistered { .. }
        )
    }

    /// Downcasts the wrapped plugin error, if any, to a concrete type.
    #[must_use]
    pub fn plugin_error<T: std::error::Error + 'static>(&self) -> Option<&T> {
        match self {
            Self::Plugin { source } => source.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Machine-readable error code used in wire envelopes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedMethod { .. } => "UNSUPPORTED_METHOD",
            Self::ServiceNotFound { .. } => "SERVICE_NOT_FOUND",
            Self::MethodNotConfigured { .. } => "METHOD_NOT_CONFIGURED",
            Self::TargetNotConfigured { .. } => "TARGET_NOT_CONFIGURED",
            Self::EmptyResponse { .. } => "EMPTY_RESPONSE",
            Self::TaskNotRegistered { .. } => "TASK_NOT_REGISTERED",
            Self::TargetNotRegistered { .. } => "TARGET_NOT_REGISTERED",
            Self::InvalidPluginConfig { .. } => "INVALID_PLUGIN_CONFIG",
            Self::BodyRead { .. } => "BAD_REQUEST",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Plugin { .. } => "PLUGIN_ERROR",
        }
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                kind: self.kind(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }
}

/// JSON error body written to the wire when a request fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Error details.
    pub error: ErrorDetail,
    /// Request identifier for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Body of an [`ErrorEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable code, e.g. `SERVICE_NOT_FOUND`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Coarse classification.
    pub kind: ErrorKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("quota exhausted")]
    struct QuotaError;

    #[test]
    fn test_status_codes_follow_kind() {
        assert_eq!(
            HubError::service_not_found("a", "b").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            HubError::unsupported_method("BREW").status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            HubError::method_not_configured(HttpMethod::Get, "orders").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HubError::cancelled("deadline").status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            HubError::body_read("reset").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_plugin_error_is_preserved() {
        let err = HubError::plugin(QuotaError);
        assert_eq!(err.to_string(), "quota exhausted");
        assert!(err.plugin_error::<QuotaError>().is_some());
        assert_eq!(err.kind(), ErrorKind::Plugin);
    }

    #[test]
    fn test_plugin_error_from_string() {
        let err = HubError::plugin("upstream refused");
        assert_eq!(err.to_string(), "upstream refused");
        assert!(err.plugin_error::<QuotaError>().is_none());
    }

    #[test]
    fn test_not_registered() {
        assert!(HubError::task_not_registered("x").is_not_registered());
        assert!(HubError::target_not_registered("y").is_not_registered());
        assert!(!HubError::empty_response("z").is_not_registered());
    }

    #[test]
    fn test_envelope() {
        let envelope = HubError::method_not_configured(HttpMethod::Patch, "orders")
            .to_envelope(Some("req-1"));
        assert_eq!(envelope.error.code, "METHOD_NOT_CONFIGURED");
        assert_eq!(envelope.error.kind, ErrorKind::Configuration);
        assert_eq!(
            envelope.error.message,
            "method PATCH is not configured for service orders"
        );

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["requestId"], "req-1");
        assert_eq!(json["error"]["kind"], "configuration");
    }
}
