//! Configuration for Hubwork applications.
//!
//! Two kinds of configuration live here:
//!
//! - **Settings** ([`HubworkConfig`]): listener addresses, logging, metrics and
//!   the application home. Loaded in layers by [`ConfigLoader`]: defaults, then
//!   a TOML or JSON file, then `HUBWORK__SECTION__KEY` environment variables.
//!   Unknown fields are rejected.
//! - **Hub documents** ([`HubDocuments`]): `hub.yaml`, `aggregates/*.yaml` and
//!   optional `schemas/*.yaml` under the application home, compiled into a
//!   [`Hub`](hubwork_core::Hub) by [`load_hub`].
//!
//! # Settings file
//!
//! ```toml
//! [server]
//! public_addr = "0.0.0.0:3531"
//! private_addr = "127.0.0.1:3532"
//! shutdown_timeout_secs = 30
//! max_body_bytes = 4194304
//! request_timeout_secs = 0
//!
//! [telemetry]
//! service_name = "recipes"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//!
//! [application]
//! name = "recipes"
//! home = "/srv/recipes"
//! ```
//!
//! # Aggregate document
//!
//! ```yaml
//! apiVersion: v1
//! specType: Aggregate
//! spec:
//!   name: orders
//!   apiName: shop
//!   isPublic: true
//!   timeoutMs: 2000
//!   handlers:
//!     - methods: [GET, POST]
//!       inbound:
//!         - name: log-request
//!           type: request_logger
//!           precedence: 0
//!       target:
//!         name: orders-store
//!         type: key_value
//! ```

#![doc(html_root_url = "https://docs.rs/hubwork-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod catalog;
mod compiler;
mod config;
pub mod definition;
mod error;
mod loader;
mod schema;

pub use catalog::{SchemaCatalog, SchemaDocument};
pub use compiler::{configure_hub, load_hub, HubCompiler, LoadedHub};
pub use config::{HubworkConfig, HubworkConfigBuilder};
pub use definition::{read_document, HubDocuments};
pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use schema::*;
