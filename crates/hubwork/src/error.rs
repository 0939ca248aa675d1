//! Bootstrap errors.

use thiserror::Error;

use hubwork_config::ConfigError;
use hubwork_server::ServerError;
use hubwork_telemetry::TelemetryError;

/// Errors raised while building or running an [`Application`](crate::Application).
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Settings or hub documents were rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listeners could not start.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Logging or metrics could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}
