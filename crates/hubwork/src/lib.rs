//! # Hubwork
//!
//! **Declarative request hub: configure services as chains of tasks around a
//! target, then serve them over HTTP.**
//!
//! - **Plugins** – tasks transform requests and responses, targets produce
//!   responses; both are built by name from YAML configuration
//! - **Workflows** – inbound and outbound task chains grouped by precedence,
//!   groups run in ascending order, steps within a group in insertion order
//! - **Two listeners** – public traffic and a private listener for health,
//!   metrics and service-to-service calls
//! - **Observability** – structured `tracing` logs, Prometheus metrics
//!   and W3C trace-context propagation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hubwork::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ApplicationError> {
//!     Application::builder("recipes")
//!         .home("/srv/recipes")
//!         .public_port(8080)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! listener → Hub (api/service) → Service (method) → Handler
//!                                                     │
//!            inbound workflow → target → outbound workflow
//! ```

#![doc(html_root_url = "https://docs.rs/hubwork/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod application;
mod error;

pub use application::{telemetry_config, Application, ApplicationBuilder};
pub use error::ApplicationError;

pub use hubwork_config as config;
pub use hubwork_core as core;
pub use hubwork_plugins as plugins;
pub use hubwork_server as server;
pub use hubwork_telemetry as telemetry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use hubwork::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{Application, ApplicationBuilder, ApplicationError};

    pub use hubwork_core::{
        CanonicalRequest, CanonicalResponse, ExecContext, Handler, HttpMethod, Hub, HubError,
        HubResult, Service, Target, Task, Workflow, WorkflowStep,
    };

    pub use hubwork_config::{ConfigLoader, HubworkConfig};

    pub use hubwork_server::ShutdownSignal;
}
