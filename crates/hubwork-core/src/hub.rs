//! The top-level dispatcher.
//!
//! ```text
//!  http::Request ─► CanonicalRequest ─► resolve {api}/{service}
//!                                         │ missing → 404 ServiceNotFound
//!                                         ▼
//!                                 Service::dispatch
//!                                         │ error → 500 (+ target response)
//!                                         ▼
//!                                 attached CanonicalResponse
//! ```
//!
//! Each routed request runs under a `hub_request` span parented on the
//! caller's W3C `traceparent`, so remote calls made while dispatching carry
//! the caller's trace.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body::Body;
use hubwork_telemetry::tracing::{finish_span, start_server_span, trace_id};
use opentelemetry::trace::FutureExt as _;
use opentelemetry::KeyValue;
use parking_lot::RwLock;
use tracing::Instrument;

use crate::context::{ExecContext, RequestId};
use crate::error::{BoxError, ErrorEnvelope, ErrorKind, HubError};
use crate::request::{routing_key, CanonicalRequest};
use crate::response::CanonicalResponse;
use crate::service::Service;

/// A request that did not produce a response.
///
/// Carries the wire status chosen by the hub, the underlying error, and, when
/// the target had already answered before an outbound step failed, the
/// target's response for diagnostics.
#[derive(Debug)]
pub struct RequestFailure {
    status: StatusCode,
    error: HubError,
    request_id: Option<RequestId>,
    target_response: Option<CanonicalResponse>,
}

impl RequestFailure {
    fn new(status: StatusCode, error: HubError) -> Self {
        Self {
            status,
            error,
            request_id: None,
            target_response: None,
        }
    }

    fn for_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    fn with_target_response(mut self, response: Option<CanonicalResponse>) -> Self {
        self.target_response = response;
        self
    }

    /// Wire status for this failure.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The underlying error.
    pub fn error(&self) -> &HubError {
        &self.error
    }

    /// Consumes the failure, returning the error.
    pub fn into_error(self) -> HubError {
        self.error
    }

    /// Identity of the failed request, when it got that far.
    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    /// Response the target produced before an outbound step failed.
    pub fn target_response(&self) -> Option<&CanonicalResponse> {
        self.target_response.as_ref()
    }

    /// A bodiless response carrying only the failure status.
    pub fn response(&self) -> CanonicalResponse {
        CanonicalResponse::new(self.status)
    }

    /// JSON error envelope for the wire.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let request_id = self.request_id.map(|id| id.to_string());
        self.error.to_envelope(request_id.as_deref())
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.status)
    }
}

impl std::error::Error for RequestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Owns the routing table and dispatches inbound requests.
///
/// ```
/// use std::sync::Arc;
/// use hubwork_core::{Handler, HttpMethod, Hub, Service};
/// use hubwork_core::fixtures::EchoTarget;
///
/// let hub = Hub::new("storefront");
/// let handler = Arc::new(Handler::builder().target(EchoTarget::new()).build());
/// hub.add_service(Service::new("Shop", "Cart").with_handler(HttpMethod::Post, handler));
///
/// assert!(hub.resolve("shop", "CART").is_some());
/// assert!(hub.resolve("shop", "orders").is_none());
/// ```
pub struct Hub {
    application_name: String,
    application_version: Option<String>,
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl Hub {
    /// Creates a hub with an empty routing table.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            application_version: None,
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Records the application version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.application_version = Some(version.into());
        self
    }

    /// Application name.
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Application version, if known.
    pub fn application_version(&self) -> Option<&str> {
        self.application_version.as_deref()
    }

    /// Inserts or replaces the service under its own routing key.
    ///
    /// Returns the service that was replaced, if any.
    pub fn add_service(&self, service: Service) -> Option<Arc<Service>> {
        let key = service.routing_key();
        let replaced = self.services.write().insert(key.clone(), Arc::new(service));
        if replaced.is_some() {
            tracing::info!(routing_key = %key, "replaced service");
        } else {
            tracing::debug!(routing_key = %key, "added service");
        }
        replaced
    }

    /// Looks up a service; names are matched case-insensitively.
    pub fn resolve(&self, api_name: &str, service_name: &str) -> Option<Arc<Service>> {
        self.services
            .read()
            .get(&routing_key(api_name, service_name))
            .cloned()
    }

    /// Registered routing keys, sorted.
    pub fn routing_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.services.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered services.
    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }

    /// Handles a raw inbound request under a fresh root context.
    pub async fn handle_request<B>(
        &self,
        request: http::Request<B>,
    ) -> Result<CanonicalResponse, RequestFailure>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        self.handle_request_with_context(&ExecContext::new(), request)
            .await
    }

    /// Handles a raw inbound request under `ctx`.
    pub async fn handle_request_with_context<B>(
        &self,
        ctx: &ExecContext,
        request: http::Request<B>,
    ) -> Result<CanonicalResponse, RequestFailure>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let request = CanonicalRequest::from_http(request).await.map_err(|err| {
            tracing::debug!(error = %err, "rejected inbound request");
            RequestFailure::new(err.status_code(), err)
        })?;
        self.handle(ctx, request).await
    }

    /// Routes and dispatches an already normalized request.
    pub async fn handle(
        &self,
        ctx: &ExecContext,
        mut request: CanonicalRequest,
    ) -> Result<CanonicalResponse, RequestFailure> {
        let request_id = request.id();
        let trace = start_server_span(
            "hub_request",
            request.headers(),
            vec![
                KeyValue::new("request.id", request_id.to_string()),
                KeyValue::new("api.name", request.api_name().to_string()),
                KeyValue::new("service.name", request.service_name().to_string()),
                KeyValue::new("http.method", request.method().to_string()),
            ],
        );
        let span = tracing::info_span!(
            "hub_request",
            request_id = %request_id,
            trace_id = %trace_id(&trace).unwrap_or_default(),
            api = %request.api_name(),
            service = %request.service_name(),
            method = %request.method(),
        );

        let outcome = async move {
            let Some(service) = self.resolve(request.api_name(), request.service_name()) else {
                let err =
                    HubError::service_not_found(request.api_name(), request.service_name());
                tracing::debug!(error = %err, "no service for routing key");
                return Err(RequestFailure::new(StatusCode::NOT_FOUND, err).for_request(request_id));
            };

            let ctx = ctx.for_request(request_id);
            match service.dispatch(&ctx, &mut request).await {
                Ok(()) => request.take_response().ok_or_else(|| {
                    RequestFailure::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        HubError::empty_response(service.name()),
                    )
                    .for_request(request_id)
                }),
                Err(err) => {
                    let status = dispatch_status(&err);
                    tracing::warn!(error = %err, status = status.as_u16(), "dispatch failed");
                    Err(RequestFailure::new(status, err)
                        .for_request(request_id)
                        .with_target_response(request.take_response()))
                }
            }
        }
        .instrument(span)
        .with_context(trace.clone())
        .await;

        let error = outcome.as_ref().err().map(ToString::to_string);
        finish_span(&trace, error.as_deref());
        outcome
    }
}

// Dispatch failures are internal errors, except an expired deadline.
fn dispatch_status(err: &HubError) -> StatusCode {
    match err.kind() {
        ErrorKind::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("application_name", &self.application_name)
            .field("application_version", &self.application_version)
            .field("services", &self.routing_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{EchoTarget, FailingTask, MarkerTask, StaticTarget};
    use crate::method::HttpMethod;
    use crate::service::Handler;
    use crate::workflow::{Workflow, WorkflowStep};
    use http_body_util::Full;

    fn http_request(method: &str, uri: &str, body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[test]
    fn test_add_service_last_write_wins() {
        let hub = Hub::new("app");
        assert!(hub.add_service(Service::new("api", "svc")).is_none());
        let replaced = hub
            .add_service(Service::new("API", "Svc").with_public(true))
            .unwrap();
        assert!(!replaced.is_public());
        assert!(hub.resolve("api", "svc").unwrap().is_public());
        assert_eq!(hub.service_count(), 1);
        assert_eq!(hub.routing_keys(), vec!["api/svc"]);
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_found() {
        let hub = Hub::new("app");
        let failure = hub
            .handle_request(http_request("GET", "/nope/missing", ""))
            .await
            .unwrap_err();
        assert_eq!(failure.status(), StatusCode::NOT_FOUND);
        assert_eq!(failure.response().status(), StatusCode::NOT_FOUND);
        assert!(matches!(failure.error(), HubError::ServiceNotFound { api, service } if api == "nope" && service == "missing"));
        assert!(failure.request_id().is_some());
    }

    #[tokio::test]
    async fn test_unsupported_method_rejected_before_routing() {
        let hub = Hub::new("app");
        let failure = hub
            .handle_request(http_request("PURGE", "/a/b", ""))
            .await
            .unwrap_err();
        assert!(matches!(failure.error(), HubError::UnsupportedMethod { .. }));
        assert_eq!(failure.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(failure.request_id().is_none());
    }

    #[tokio::test]
    async fn test_target_response_returned_verbatim() {
        let expected = CanonicalResponse::new(StatusCode::CREATED)
            .with_header(
                http::header::LOCATION,
                http::HeaderValue::from_static("/shop/cart/1"),
            )
            .with_body("created");
        let hub = Hub::new("app");
        let handler = Handler::builder()
            .target(Arc::new(StaticTarget::new(expected.clone())))
            .build();
        hub.add_service(Service::new("shop", "cart").with_handler(HttpMethod::Post, Arc::new(handler)));

        let response = hub
            .handle_request(http_request("post", "/Shop/Cart", "{}"))
            .await
            .unwrap();
        assert_eq!(response, expected);
    }

    #[tokio::test]
    async fn test_internal_prefix_routes_same_service() {
        let hub = Hub::new("app");
        let handler = Handler::builder().target(EchoTarget::new()).build();
        hub.add_service(Service::new("shop", "cart").with_handler(HttpMethod::Put, Arc::new(handler)));

        let response = hub
            .handle_request(http_request("PUT", "/internal/call/shop/cart/7", "x"))
            .await
            .unwrap();
        assert_eq!(response.body().as_ref(), b"x");
    }

    #[tokio::test]
    async fn test_dispatch_error_maps_to_internal_error() {
        let hub = Hub::new("app");
        let handler = Handler::builder().target(EchoTarget::new()).build();
        hub.add_service(Service::new("shop", "cart").with_handler(HttpMethod::Get, Arc::new(handler)));

        let failure = hub
            .handle_request(http_request("DELETE", "/shop/cart", ""))
            .await
            .unwrap_err();
        assert_eq!(failure.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(failure.error(), HubError::MethodNotConfigured { .. }));
        assert!(failure.target_response().is_none());
    }

    /// Answers with the trace id active while the target runs.
    struct TraceIdTarget;

    #[async_trait::async_trait]
    impl crate::plugin::Target for TraceIdTarget {
        async fn apply(
            &self,
            _ctx: &ExecContext,
            _request: &mut CanonicalRequest,
        ) -> crate::HubResult<Option<CanonicalResponse>> {
            let current = trace_id(&opentelemetry::Context::current()).unwrap_or_default();
            Ok(Some(CanonicalResponse::new(StatusCode::OK).with_body(current)))
        }
    }

    #[tokio::test]
    async fn test_dispatch_continues_caller_trace() {
        hubwork_telemetry::init_tracing(&hubwork_telemetry::TracingConfig::default()).unwrap();
        let hub = Hub::new("app");
        let handler = Handler::builder().target(Arc::new(TraceIdTarget)).build();
        hub.add_service(Service::new("shop", "cart").with_handler(HttpMethod::Get, Arc::new(handler)));

        let request = http::Request::builder()
            .method("GET")
            .uri("/shop/cart")
            .header(
                "traceparent",
                "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            )
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = hub.handle_request(request).await.unwrap();
        assert_eq!(
            response.body().as_ref(),
            b"0af7651916cd43dd8448eb211c80319c"
        );
    }

    #[tokio::test]
    async fn test_outbound_failure_keeps_target_body_for_diagnostics() {
        let hub = Hub::new("app");
        let handler = Handler::builder()
            .target(EchoTarget::new())
            .outbound(
                Workflow::new()
                    .with_step(WorkflowStep::new("tag", 0, Arc::new(MarkerTask::new("!"))))
                    .with_step(WorkflowStep::new("fail", 1, Arc::new(FailingTask::new("fail")))),
            )
            .build();
        hub.add_service(Service::new("shop", "cart").with_handler(HttpMethod::Post, Arc::new(handler)));

        let failure = hub
            .handle_request(http_request("POST", "/shop/cart", "order"))
            .await
            .unwrap_err();
        assert_eq!(failure.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            failure.target_response().unwrap().body().as_ref(),
            b"order!"
        );
        let envelope = failure.to_envelope();
        assert_eq!(envelope.error.code, "PLUGIN_ERROR");
        assert!(envelope.request_id.is_some());
    }
}
