//! Canonical response produced by targets.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HubError, HubResult};

/// Uniform response shape handed back by a target.
///
/// Outbound workflow steps may adjust status, headers or body in place
/// through [`CanonicalRequest::response_mut`](crate::CanonicalRequest::response_mut).
///
/// ```
/// use http::StatusCode;
/// use hubwork_core::CanonicalResponse;
///
/// let response = CanonicalResponse::new(StatusCode::CREATED).with_body("done");
/// assert_eq!(response.status(), StatusCode::CREATED);
/// assert_eq!(response.body().as_ref(), b"done");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalResponse {
    status: StatusCode,
    headers: HeaderMap,
    trailers: HeaderMap,
    body: Bytes,
}

impl CanonicalResponse {
    /// Creates an empty response with the given status.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            trailers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates an empty `200 OK` response.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Creates a response whose body is `value` serialized as JSON.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> HubResult<Self> {
        let body = serde_json::to_vec(value).map_err(HubError::plugin)?;
        Ok(Self::new(status)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(body))
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Appends a header value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces all trailers.
    #[must_use]
    pub fn with_trailers(mut self, trailers: HeaderMap) -> Self {
        self.trailers = trailers;
        self
    }

    /// Status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Overwrites the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Response trailers.
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    /// Mutable response trailers.
    pub fn trailers_mut(&mut self) -> &mut HeaderMap {
        &mut self.trailers
    }

    /// Body bytes.
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

    /// Splits into status, headers, body and trailers.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes, HeaderMap) {
        (self.status, self.headers, self.body, self.trailers)
    }

    /// Converts into an `http::Response`, dropping trailers.
    ///
    /// Headers are copied first, then the status is set, then the body.
    pub fn into_http(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(Bytes::new());
        *response.headers_mut() = self.headers;
        *response.status_mut() = self.status;
        *response.body_mut() = self.body;
        response
    }
}

impl Default for CanonicalResponse {
    fn default() -> Self {
        Self::ok()
    }
}
