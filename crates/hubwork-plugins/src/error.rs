//! Errors raised by the built-in plugins.

use hubwork_core::HubError;
use thiserror::Error;

/// Failures of built-in tasks and targets.
///
/// They reach the hub wrapped in [`HubError::Plugin`]; callers can get them
/// back with [`HubError::plugin_error`].
#[derive(Debug, Error)]
pub enum PluginError {
    /// The upstream answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    UpstreamStatus {
        /// HTTP status from upstream.
        status: u16,
        /// Upstream body, lossily decoded.
        body: String,
    },

    /// The upstream could not be reached or timed out.
    #[error("upstream request failed: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The upstream reply was not a valid response envelope.
    #[error("malformed upstream reply: {message}")]
    MalformedReply {
        /// Error message.
        message: String,
    },

    /// A log template names a field that does not exist.
    #[error("unknown template field {field:?}")]
    UnknownTemplate {
        /// The template text between the braces.
        field: String,
    },
}

impl PluginError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a malformed reply error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedReply {
            message: message.into(),
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Transport failures and upstream 5xx replies are retried; client errors
    /// and undecodable replies are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::UpstreamStatus { status, .. } => *status >= 500,
            Self::MalformedReply { .. } | Self::UnknownTemplate { .. } => false,
        }
    }
}

impl From<reqwest::Error> for PluginError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

impl From<PluginError> for HubError {
    fn from(err: PluginError) -> Self {
        Self::plugin(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(PluginError::transport("connection refused").is_retryable());
        assert!(PluginError::UpstreamStatus {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!PluginError::UpstreamStatus {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(!PluginError::malformed("eof").is_retryable());
    }

    #[test]
    fn test_converts_into_plugin_hub_error() {
        let err: HubError = PluginError::UnknownTemplate {
            field: "Request.Nope".to_string(),
        }
        .into();
        assert!(matches!(
            err.plugin_error::<PluginError>(),
            Some(PluginError::UnknownTemplate { .. })
        ));
        assert_eq!(err.to_string(), r#"unknown template field "Request.Nope""#);
    }
}
