//! # Hubwork Core
//!
//! Request model and dispatch engine for Hubwork.
//!
//! - [`CanonicalRequest`] / [`CanonicalResponse`] - transport-independent request and response
//! - [`Task`] / [`Target`] - plugin contracts, built by name through [`TaskRegistry`] and [`TargetRegistry`]
//! - [`Workflow`] - precedence-ordered chain of tasks
//! - [`Service`] / [`Handler`] - per-method routing to inbound workflow, target and outbound workflow
//! - [`Hub`] - the routing table and top-level dispatcher
//! - [`Backoff`] - bounded exponential retries for plugins
//! - [`HubError`] - error type shared by every layer

#![doc(html_root_url = "https://docs.rs/hubwork-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod backoff;
mod context;
mod error;
pub mod fixtures;
mod hub;
mod method;
mod plugin;
mod registry;
mod request;
mod response;
mod service;
mod workflow;

pub use backoff::{
    is_unrecoverable, mark_unrecoverable, Backoff, BackoffConfig, BackoffError,
    UNRECOVERABLE_MARKER,
};
pub use context::{ExecContext, RequestId};
pub use error::{BoxError, ErrorDetail, ErrorEnvelope, ErrorKind, HubError, HubResult};
pub use hub::{Hub, RequestFailure};
pub use method::HttpMethod;
pub use plugin::{decode_config, Target, TargetFactory, Task, TaskFactory};
pub use registry::{Registries, TargetRegistry, TaskRegistry};
pub use request::{
    routing_key, CanonicalRequest, CanonicalRequestBuilder, RemoteAddr, RoutePath, TransportMeta,
    INTERNAL_CALL_PREFIX,
};
pub use response::CanonicalResponse;
pub use service::{Handler, HandlerBuilder, Service};
pub use workflow::{Workflow, WorkflowStep};
