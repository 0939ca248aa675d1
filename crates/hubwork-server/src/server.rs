//! The public and private HTTP/1.1 listeners.
//!
//! ```text
//!   public  ──► /{api}/{service}/...            ──► hub (public services only)
//!   private ──► /health /ready /metrics
//!           └─► /internal/call/{api}/{service}  ──► hub (every service)
//! ```
//!
//! Each connection owns a cancellation token that is cancelled when the
//! connection closes; every request's [`ExecContext`] is a child of it.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::stream;
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use hubwork_config::ServerConfig;
use hubwork_core::{
    CanonicalResponse, ErrorDetail, ErrorEnvelope, ErrorKind, ExecContext, HttpMethod, Hub,
    HubError, RemoteAddr, RoutePath, INTERNAL_CALL_PREFIX,
};
use hubwork_telemetry::{record_request, render_metrics, InFlightGuard};

use crate::error::{ServerError, ServerResult};
use crate::health::HealthCheck;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Response body type written by both listeners.
pub type ResponseBody = BoxBody<Bytes, Infallible>;

/// Which listener accepted a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    /// Client-facing listener.
    Public,
    /// Operations and service-to-service listener.
    Private,
}

impl Listener {
    fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

struct Shared {
    hub: Arc<Hub>,
    health: HealthCheck,
    max_body_bytes: usize,
    request_timeout: Option<Duration>,
}

/// A configured, not yet bound server.
///
/// ```rust,ignore
/// let server = Server::builder()
///     .hub(hub)
///     .public_addr("0.0.0.0:3531")
///     .private_addr("127.0.0.1:3532")
///     .build()?;
/// server.run().await?;
/// ```
pub struct Server {
    shared: Arc<Shared>,
    public_addr: SocketAddr,
    private_addr: Option<SocketAddr>,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("application", &self.shared.hub.application_name())
            .field("public_addr", &self.public_addr)
            .field("private_addr", &self.private_addr)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Starts a builder with default listener settings.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Configured public address.
    #[must_use]
    pub fn public_addr(&self) -> SocketAddr {
        self.public_addr
    }

    /// Configured private address.
    #[must_use]
    pub fn private_addr(&self) -> Option<SocketAddr> {
        self.private_addr
    }

    /// Liveness and readiness state.
    #[must_use]
    pub fn health(&self) -> &HealthCheck {
        &self.shared.health
    }

    /// Binds and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals())
            .await
    }

    /// Binds and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        self.bind().await?.serve(shutdown).await
    }

    /// Binds both listeners without accepting yet.
    pub async fn bind(self) -> ServerResult<BoundServer> {
        let public = bind(self.public_addr).await?;
        let private = match self.private_addr {
            Some(addr) => Some(bind(addr).await?),
            None => None,
        };
        Ok(BoundServer {
            server: self,
            public,
            private,
        })
    }
}

async fn bind(addr: SocketAddr) -> ServerResult<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// A server whose listeners are bound.
#[derive(Debug)]
pub struct BoundServer {
    server: Server,
    public: TcpListener,
    private: Option<TcpListener>,
}

impl BoundServer {
    /// Actual public address (useful with port 0).
    pub fn public_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.public.local_addr()?)
    }

    /// Actual private address.
    pub fn private_addr(&self) -> ServerResult<Option<SocketAddr>> {
        self.private
            .as_ref()
            .map(TcpListener::local_addr)
            .transpose()
            .map_err(ServerError::from)
    }

    /// Accepts connections until `shutdown` triggers, then drains.
    pub async fn serve(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let Self {
            server,
            public,
            private,
        } = self;
        let shared = server.shared;
        let tracker = ConnectionTracker::new();

        tracing::info!(
            application = %shared.hub.application_name(),
            public = %public.local_addr()?,
            private = ?private.as_ref().and_then(|l| l.local_addr().ok()),
            services = shared.hub.service_count(),
            "hub listening"
        );
        shared.health.set_ready(true);

        let public_loop = accept_loop(
            Arc::clone(&shared),
            public,
            Listener::Public,
            shutdown.clone(),
            tracker.clone(),
        );
        match private {
            Some(private) => {
                let private_loop = accept_loop(
                    Arc::clone(&shared),
                    private,
                    Listener::Private,
                    shutdown.clone(),
                    tracker.clone(),
                );
                tokio::join!(public_loop, private_loop);
            }
            None => public_loop.await,
        }

        shared.health.set_ready(false);
        tracing::info!(
            open = tracker.active_connections(),
            timeout_secs = server.shutdown_timeout.as_secs(),
            "draining connections"
        );
        if tokio::time::timeout(server.shutdown_timeout, tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                open = tracker.active_connections(),
                "shutdown timeout reached with open connections"
            );
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    kind: Listener,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let token = tracker.acquire();
                    let shared = Arc::clone(&shared);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        serve_connection(shared, stream, remote, kind, shutdown).await;
                        drop(token);
                    });
                }
                Err(e) => tracing::error!(listener = kind.as_str(), error = %e, "accept failed"),
            },
            () = shutdown.recv() => {
                tracing::debug!(listener = kind.as_str(), "listener stopped accepting");
                break;
            }
        }
    }
}

async fn serve_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    remote: SocketAddr,
    kind: Listener,
    shutdown: ShutdownSignal,
) {
    let connection = CancellationToken::new();
    let _cancel_on_close = connection.clone().drop_guard();

    let service = service_fn(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(RemoteAddr(remote));
        let shared = Arc::clone(&shared);
        let ctx = ExecContext::with_token(connection.child_token());
        async move { Ok::<_, Infallible>(shared.handle(kind, req, ctx).await) }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(%remote, error = %e, "connection closed with error");
    }
}

impl Shared {
    async fn handle(
        &self,
        kind: Listener,
        req: Request<Incoming>,
        ctx: ExecContext,
    ) -> Response<ResponseBody> {
        let path = req.uri().path().to_string();

        let health_method = matches!(*req.method(), Method::GET | Method::HEAD);
        if kind == Listener::Private && health_method {
            match path.as_str() {
                "/health" => return json_response(StatusCode::OK, &self.health.health(&self.hub)),
                "/ready" => {
                    let readiness = self.health.readiness(&self.hub);
                    let status = if readiness.ready {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    return json_response(status, &readiness);
                }
                "/metrics" => return metrics_response(),
                _ => {}
            }
        }

        if let Err(err) = HttpMethod::try_from(req.method()) {
            tracing::debug!(listener = kind.as_str(), method = %req.method(), "rejected method");
            return error_response(err.status_code(), &err.to_envelope(None));
        }

        let route = RoutePath::parse(&path);
        let internal = is_internal_call(&path);
        let visible = match kind {
            Listener::Public => {
                !internal
                    && self
                        .hub
                        .resolve(&route.api_name, &route.service_name)
                        .map_or(true, |service| service.is_public())
            }
            Listener::Private => internal,
        };
        if !visible {
            tracing::debug!(listener = kind.as_str(), %path, "route not exposed on this listener");
            let err = HubError::service_not_found(&route.api_name, &route.service_name);
            return error_response(StatusCode::NOT_FOUND, &err.to_envelope(None));
        }

        let (parts, body) = req.into_parts();
        if declared_length(&parts.headers).is_some_and(|len| len > self.max_body_bytes as u64) {
            return self.payload_too_large();
        }
        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(body) => body,
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return self.payload_too_large();
            }
            Err(e) => {
                let err = HubError::body_read(e.to_string());
                return error_response(err.status_code(), &err.to_envelope(None));
            }
        };
        let method = parts.method.to_string();
        let request = Request::from_parts(parts, body);

        let ctx = match self.request_timeout {
            Some(timeout) => ctx.child_with_timeout(timeout),
            None => ctx,
        };

        let started = Instant::now();
        let _in_flight = InFlightGuard::new();
        let outcome = self.hub.handle_request_with_context(&ctx, request).await;
        let status = match &outcome {
            Ok(response) => response.status(),
            Err(failure) => failure.status(),
        };
        record_request(
            &route.api_name,
            &route.service_name,
            &method,
            status.as_u16(),
            started.elapsed(),
        );

        match outcome {
            Ok(response) => render(response),
            Err(failure) => {
                if failure.status().is_server_error() {
                    tracing::warn!(
                        request_id = ?failure.request_id().map(|id| id.to_string()),
                        status = failure.status().as_u16(),
                        error = %failure.error(),
                        upstream_status = ?failure.target_response().map(|r| r.status().as_u16()),
                        "request failed"
                    );
                }
                error_response(failure.status(), &failure.to_envelope())
            }
        }
    }

    fn payload_too_large(&self) -> Response<ResponseBody> {
        let envelope = ErrorEnvelope {
            error: ErrorDetail {
                code: "PAYLOAD_TOO_LARGE".to_string(),
                message: format!("request body exceeds {} bytes", self.max_body_bytes),
                kind: ErrorKind::BadRequest,
            },
            request_id: None,
        };
        error_response(StatusCode::PAYLOAD_TOO_LARGE, &envelope)
    }
}

fn is_internal_call(path: &str) -> bool {
    path.strip_prefix(INTERNAL_CALL_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn declared_length(headers: &http::HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Writes a canonical response, with trailers when it has any.
pub fn render(response: CanonicalResponse) -> Response<ResponseBody> {
    let (status, headers, body, trailers) = response.into_parts();
    let body = if trailers.is_empty() {
        Full::new(body).boxed()
    } else {
        let frames = [
            Ok::<_, Infallible>(Frame::data(body)),
            Ok(Frame::trailers(trailers)),
        ];
        StreamBody::new(stream::iter(frames)).boxed()
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response body");
            (StatusCode::INTERNAL_SERVER_ERROR, b"{}".to_vec())
        }
    };
    let mut response = Response::new(Full::new(Bytes::from(body)).boxed());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, envelope: &ErrorEnvelope) -> Response<ResponseBody> {
    json_response(status, envelope)
}

fn metrics_response() -> Response<ResponseBody> {
    match render_metrics() {
        Some(text) => {
            let mut response = Response::new(Full::new(Bytes::from(text)).boxed());
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        None => {
            let envelope = ErrorEnvelope {
                error: ErrorDetail {
                    code: "METRICS_DISABLED".to_string(),
                    message: "no metrics recorder installed".to_string(),
                    kind: ErrorKind::NotFound,
                },
                request_id: None,
            };
            error_response(StatusCode::NOT_FOUND, &envelope)
        }
    }
}

/// Builder for [`Server`].
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    hub: Option<Arc<Hub>>,
    public_addr: String,
    private_addr: Option<String>,
    shutdown_timeout: Duration,
    max_body_bytes: usize,
    request_timeout: Option<Duration>,
}

impl ServerBuilder {
    /// Defaults from [`ServerConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            hub: None,
            public_addr: String::new(),
            private_addr: None,
            shutdown_timeout: Duration::ZERO,
            max_body_bytes: 0,
            request_timeout: None,
        };
        builder.apply(&ServerConfig::default());
        builder
    }

    fn apply(&mut self, config: &ServerConfig) {
        self.public_addr.clone_from(&config.public_addr);
        self.private_addr.clone_from(&config.private_addr);
        self.shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
        self.max_body_bytes = config.max_body_bytes;
        self.request_timeout =
            (config.request_timeout_secs > 0).then(|| Duration::from_secs(config.request_timeout_secs));
    }

    /// The hub requests are dispatched to.
    #[must_use]
    pub fn hub(mut self, hub: Arc<Hub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Takes every listener setting from `config`, replacing earlier calls.
    #[must_use]
    pub fn config(mut self, config: &ServerConfig) -> Self {
        self.apply(config);
        self
    }

    /// Public listener address.
    #[must_use]
    pub fn public_addr(mut self, addr: impl Into<String>) -> Self {
        self.public_addr = addr.into();
        self
    }

    /// Private listener address.
    #[must_use]
    pub fn private_addr(mut self, addr: impl Into<String>) -> Self {
        self.private_addr = Some(addr.into());
        self
    }

    /// Disables the private listener.
    #[must_use]
    pub fn without_private_listener(mut self) -> Self {
        self.private_addr = None;
        self
    }

    /// Drain timeout after shutdown is triggered.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Largest accepted request body.
    #[must_use]
    pub fn max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Per-request deadline.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Validates addresses and produces the server.
    pub fn build(self) -> ServerResult<Server> {
        let hub = self.hub.ok_or(ServerError::MissingHub)?;
        let public_addr = parse_addr(&self.public_addr)?;
        let private_addr = self.private_addr.as_deref().map(parse_addr).transpose()?;

        Ok(Server {
            shared: Arc::new(Shared {
                hub,
                health: HealthCheck::new(),
                max_body_bytes: self.max_body_bytes,
                request_timeout: self.request_timeout,
            }),
            public_addr,
            private_addr,
            shutdown_timeout: self.shutdown_timeout,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_addr(addr: &str) -> ServerResult<SocketAddr> {
    addr.parse().map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
        addr: addr.to_string(),
        reason: e.to_string(),
    })
}
