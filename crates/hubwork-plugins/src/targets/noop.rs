use async_trait::async_trait;
use http::StatusCode;
use hubwork_core::{CanonicalRequest, CanonicalResponse, ExecContext, HubResult, Target};

/// Answers 200 with the request's own body, headers and trailers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTarget;

impl NoopTarget {
    /// Registered type name.
    pub const TYPE: &'static str = "noop";
}

#[async_trait]
impl Target for NoopTarget {
    async fn apply(
        &self,
        _ctx: &ExecContext,
        request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>> {
        Ok(Some(
            CanonicalResponse::new(StatusCode::OK)
                .with_headers(request.headers().clone())
                .with_trailers(request.trailers().clone())
                .with_body(request.body().clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderValue, CONTENT_TYPE};
    use http::{HeaderMap, Uri};
    use hubwork_core::HttpMethod;

    #[tokio::test]
    async fn test_echoes_request() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc"));
        let mut request = CanonicalRequest::builder(HttpMethod::Put, Uri::from_static("/a/b"))
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .trailers(trailers)
            .body("same")
            .build();

        let response = NoopTarget
            .apply(&ExecContext::new(), &mut request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"same");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.trailers()["x-checksum"], "abc");
    }
}
