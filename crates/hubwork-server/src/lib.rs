//! # Hubwork Server
//!
//! HTTP/1.1 listeners in front of a [`Hub`](hubwork_core::Hub).
//!
//! - A public listener serving services marked public
//! - A private listener serving `/health`, `/ready`, `/metrics` and
//!   `/internal/call/{api}/{service}/...` for every service
//! - Request body limits and per-request deadlines
//! - Graceful shutdown with a bounded drain
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hubwork_core::Hub;
//! use hubwork_server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Arc::new(Hub::new("recipes"));
//!     Server::builder()
//!         .hub(hub)
//!         .public_addr("0.0.0.0:3531")
//!         .private_addr("127.0.0.1:3532")
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/hubwork-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod health;
mod server;
pub mod shutdown;

pub use error::{ServerError, ServerResult};
pub use health::{HealthCheck, HealthStatus, ReadinessStatus};
pub use server::{render, BoundServer, Listener, ResponseBody, Server, ServerBuilder};
pub use shutdown::{ConnectionTracker, ConnectionToken, ShutdownSignal};
