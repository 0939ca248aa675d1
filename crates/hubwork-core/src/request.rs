//! Canonical in-flight request and routing-key derivation.
//!
//! A [`CanonicalRequest`] is built once per inbound request by the hub and
//! is passed by `&mut` through the inbound workflow, the target and the
//! outbound workflow.
//!
//! ```text
//!  /internal/call/Orders/Invoice/42?draft=true
//!  └──── prefix ─┘└ api ┘└ svc ──┘└ ignored for routing
//!
//!  routing key: "orders/invoice"
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Uri, Version};
use http_body::Body;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::context::RequestId;
use crate::error::{BoxError, HubError, HubResult};
use crate::method::HttpMethod;
use crate::response::CanonicalResponse;

/// Path prefix used for service-to-service calls; stripped before routing.
pub const INTERNAL_CALL_PREFIX: &str = "/internal/call";

/// Builds the lower-cased routing key `{api}/{service}`.
///
/// ```
/// assert_eq!(hubwork_core::routing_key("Orders", "Invoice"), "orders/invoice");
/// ```
#[must_use]
pub fn routing_key(api_name: &str, service_name: &str) -> String {
    format!("{api_name}/{service_name}").to_lowercase()
}

/// API and service names derived from a request path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutePath {
    /// First significant segment.
    pub api_name: String,
    /// Second significant segment; empty when the path has only one.
    pub service_name: String,
    /// The path with the internal-call prefix removed.
    pub internal_path: String,
}

impl RoutePath {
    /// Parses a request path.
    ///
    /// ```
    /// use hubwork_core::RoutePath;
    ///
    /// let route = RoutePath::parse("/internal/call/shop/cart/items");
    /// assert_eq!(route.api_name, "shop");
    /// assert_eq!(route.service_name, "cart");
    /// assert_eq!(route.internal_path, "/shop/cart/items");
    ///
    /// let single = RoutePath::parse("/shop");
    /// assert_eq!(single.service_name, "");
    /// ```
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let internal_path = strip_internal_prefix(path);
        let mut segments = internal_path.trim_matches('/').split('/');
        let api_name = segments.next().unwrap_or_default().to_string();
        let service_name = segments.next().unwrap_or_default().to_string();
        Self {
            api_name,
            service_name,
            internal_path: internal_path.to_string(),
        }
    }

    /// The lower-cased routing key for this path.
    #[must_use]
    pub fn key(&self) -> String {
        routing_key(&self.api_name, &self.service_name)
    }
}

fn strip_internal_prefix(path: &str) -> &str {
    match path.strip_prefix(INTERNAL_CALL_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Remote peer address, inserted into request extensions by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Transport details carried over from the inbound envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMeta {
    /// Protocol version.
    pub version: Version,
    /// Address of the client, when the listener knows it.
    pub remote_addr: Option<SocketAddr>,
    /// Declared `Content-Length`.
    pub content_length: Option<u64>,
    /// `Host` header or URI authority.
    pub host: Option<String>,
    /// The unmodified request target.
    pub request_uri: String,
    /// Declared transfer codings, in order.
    pub transfer_encoding: Vec<String>,
}

impl TransportMeta {
    fn from_parts(parts: &http::request::Parts) -> Self {
        let headers = &parts.headers;
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .or_else(|| parts.uri.authority().map(ToString::to_string));
        let transfer_encoding = headers
            .get_all(TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        Self {
            version: parts.version,
            remote_addr: parts.extensions.get::<RemoteAddr>().map(|addr| addr.0),
            content_length,
            host,
            request_uri: parts.uri.to_string(),
            transfer_encoding,
        }
    }
}

/// The in-flight request threaded through a service's handler.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    id: RequestId,
    api_name: String,
    service_name: String,
    method: HttpMethod,
    uri: Uri,
    internal_path: String,
    params: HashMap<String, String>,
    body: Bytes,
    headers: HeaderMap,
    trailers: HeaderMap,
    response: Option<CanonicalResponse>,
    transport: TransportMeta,
}

impl CanonicalRequest {
    /// Starts building a request by hand (plugins and tests).
    pub fn builder(method: HttpMethod, uri: Uri) -> CanonicalRequestBuilder {
        CanonicalRequestBuilder::new(method, uri)
    }

    /// Normalizes an inbound `http::Request`.
    ///
    /// The method is validated before the body is read; unsupported methods
    /// fail with [`HubError::UnsupportedMethod`]. The body is collected in
    /// full together with any trailers.
    pub async fn from_http<B>(request: http::Request<B>) -> HubResult<Self>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let method = HttpMethod::try_from(&parts.method)?;

        let collected = body
            .collect()
            .await
            .map_err(|e| {
                let source: BoxError = e.into();
                HubError::body_read(source.to_string())
            })?;
        let trailers = collected.trailers().cloned().unwrap_or_default();
        let body = collected.to_bytes();

        let transport = TransportMeta::from_parts(&parts);
        let mut request = CanonicalRequestBuilder::new(method, parts.uri)
            .headers(parts.headers)
            .trailers(trailers)
            .body(body)
            .build();
        request.transport = transport;
        Ok(request)
    }

    /// Unique identity of this request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// API name taken from the path.
    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    /// Service name taken from the path.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Lower-cased routing key.
    pub fn routing_key(&self) -> String {
        routing_key(&self.api_name, &self.service_name)
    }

    /// Request method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Original request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Path without the internal-call prefix.
    pub fn internal_path(&self) -> &str {
        &self.internal_path
    }

    /// Decoded query parameters; the last value wins for repeated keys.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Looks up one query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Decodes the body as JSON.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request trailers.
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    /// Mutable request trailers.
    pub fn trailers_mut(&mut self) -> &mut HeaderMap {
        &mut self.trailers
    }

    /// Transport metadata from the inbound envelope.
    pub fn transport(&self) -> &TransportMeta {
        &self.transport
    }

    /// The response attached by the target, if dispatch got that far.
    pub fn response(&self) -> Option<&CanonicalResponse> {
        self.response.as_ref()
    }

    /// Mutable access to the attached response.
    ///
    /// Steps can rewrite a response but cannot create one.
    pub fn response_mut(&mut self) -> Option<&mut CanonicalResponse> {
        self.response.as_mut()
    }

    /// Removes and returns the attached response.
    pub fn take_response(&mut self) -> Option<CanonicalResponse> {
        self.response.take()
    }

    pub(crate) fn attach_response(&mut self, response: CanonicalResponse) {
        self.response = Some(response);
    }
}

/// Builder for [`CanonicalRequest`].
///
/// ```
/// use http::Uri;
/// use hubwork_core::{CanonicalRequest, HttpMethod};
///
/// let request = CanonicalRequest::builder(HttpMethod::Post, Uri::from_static("/shop/cart?id=7"))
///     .body(r#"{"sku":"a-1"}"#)
///     .build();
/// assert_eq!(request.routing_key(), "shop/cart");
/// assert_eq!(request.param("id"), Some("7"));
/// ```
#[derive(Debug)]
pub struct CanonicalRequestBuilder {
    id: Option<RequestId>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    trailers: HeaderMap,
    body: Bytes,
    transport: TransportMeta,
}

impl CanonicalRequestBuilder {
    fn new(method: HttpMethod, uri: Uri) -> Self {
        Self {
            id: None,
            method,
            uri,
            headers: HeaderMap::new(),
            trailers: HeaderMap::new(),
            body: Bytes::new(),
            transport: TransportMeta::default(),
        }
    }

    /// Uses a fixed identity instead of a fresh one.
    #[must_use]
    pub fn id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces all trailers.
    #[must_use]
    pub fn trailers(mut self, trailers: HeaderMap) -> Self {
        self.trailers = trailers;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets transport metadata.
    #[must_use]
    pub fn transport(mut self, transport: TransportMeta) -> Self {
        self.transport = transport;
        self
    }

    /// Builds the request, deriving routing keys and query parameters.
    pub fn build(self) -> CanonicalRequest {
        let route = RoutePath::parse(self.uri.path());
        let params = self.uri.query().map(parse_query).unwrap_or_default();
        let mut transport = self.transport;
        if transport.request_uri.is_empty() {
            transport.request_uri = self.uri.to_string();
        }

        CanonicalRequest {
            id: self.id.unwrap_or_default(),
            api_name: route.api_name,
            service_name: route.service_name,
            method: self.method,
            uri: self.uri,
            internal_path: route.internal_path,
            params,
            body: self.body,
            headers: self.headers,
            trailers: self.trailers,
            response: None,
            transport,
        }
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}
