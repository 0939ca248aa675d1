//! Listener errors.

use thiserror::Error;

/// Errors raised while starting or running the listeners.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An address could not be parsed.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The rejected text.
        addr: String,
        /// Parser message.
        reason: String,
    },

    /// Binding a listener failed.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The builder was finished without a hub.
    #[error("no hub configured")]
    MissingHub,

    /// I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for listener operations.
pub type ServerResult<T> = Result<T, ServerError>;
