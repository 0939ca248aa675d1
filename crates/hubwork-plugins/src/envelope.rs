//! JSON envelopes exchanged with remote services.
//!
//! Bodies travel base64-encoded so binary payloads survive the JSON hop.
//! Header values that are not valid UTF-8 are dropped.
//!
//! ```json
//! {"id": "...", "apiName": "kitchen", "serviceName": "recipes",
//!  "method": "POST", "path": "/kitchen/recipes", "query": "page=2",
//!  "headers": {"content-type": ["application/json"]}, "body": "e30="}
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use hubwork_core::{CanonicalRequest, CanonicalResponse};
use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// Header map in wire form: lower-cased name to all of its values.
pub type WireHeaders = BTreeMap<String, Vec<String>>;

/// A request as sent to an upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Request identity.
    pub id: String,
    /// API name.
    pub api_name: String,
    /// Service name.
    pub service_name: String,
    /// HTTP method.
    pub method: String,
    /// Path without the internal-call prefix.
    pub path: String,
    /// Raw query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Request headers.
    #[serde(default)]
    pub headers: WireHeaders,
    /// Request body.
    #[serde(default, with = "base64_body")]
    pub body: Bytes,
}

impl RequestEnvelope {
    /// Captures the current state of a canonical request.
    #[must_use]
    pub fn from_request(request: &CanonicalRequest) -> Self {
        Self {
            id: request.id().to_string(),
            api_name: request.api_name().to_string(),
            service_name: request.service_name().to_string(),
            method: request.method().to_string(),
            path: request.internal_path().to_string(),
            query: request.uri().query().map(ToString::to_string),
            headers: to_wire(request.headers()),
            body: request.body().clone(),
        }
    }
}

/// A response as returned by an upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: WireHeaders,
    /// Response body.
    #[serde(default, with = "base64_body")]
    pub body: Bytes,
}

impl ResponseEnvelope {
    /// Captures a canonical response.
    #[must_use]
    pub fn from_response(response: &CanonicalResponse) -> Self {
        Self {
            status_code: response.status().as_u16(),
            headers: to_wire(response.headers()),
            body: response.body().clone(),
        }
    }

    /// Decoded status code.
    pub fn status(&self) -> Result<StatusCode, PluginError> {
        StatusCode::from_u16(self.status_code)
            .map_err(|_| PluginError::malformed(format!("invalid status code {}", self.status_code)))
    }

    /// Decoded headers.
    pub fn header_map(&self) -> Result<HeaderMap, PluginError> {
        from_wire(&self.headers)
    }

    /// Converts into a canonical response.
    pub fn into_response(self) -> Result<CanonicalResponse, PluginError> {
        let status = self.status()?;
        let headers = self.header_map()?;
        Ok(CanonicalResponse::new(status)
            .with_headers(headers)
            .with_body(self.body))
    }
}

/// Converts a header map into wire form.
#[must_use]
pub fn to_wire(headers: &HeaderMap) -> WireHeaders {
    let mut wire = WireHeaders::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            wire.entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    wire
}

/// Parses wire headers back into a header map.
pub fn from_wire(wire: &WireHeaders) -> Result<HeaderMap, PluginError> {
    let mut headers = HeaderMap::new();
    for (name, values) in wire {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PluginError::malformed(format!("header name {name:?}: {e}")))?;
        for value in values {
            let value = HeaderValue::from_str(value)
                .map_err(|e| PluginError::malformed(format!("header {name}: {e}")))?;
            headers.append(name.clone(), value);
        }
    }
    Ok(headers)
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use http::Uri;
    use hubwork_core::HttpMethod;
    use serde_json::json;

    #[test]
    fn test_request_envelope_wire_shape() {
        let request = CanonicalRequest::builder(
            HttpMethod::Put,
            Uri::from_static("/internal/call/kitchen/recipes/7?draft=true"),
        )
        .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .body("hi")
        .build();

        let envelope = RequestEnvelope::from_request(&request);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["apiName"], "kitchen");
        assert_eq!(value["serviceName"], "recipes");
        assert_eq!(value["method"], "PUT");
        assert_eq!(value["path"], "/kitchen/recipes/7");
        assert_eq!(value["query"], "draft=true");
        assert_eq!(value["headers"]["content-type"], json!(["text/plain"]));
        assert_eq!(value["body"], "aGk=");
    }

    #[test]
    fn test_response_envelope_decodes_into_response() {
        let envelope: ResponseEnvelope = serde_json::from_value(json!({
            "statusCode": 201,
            "headers": {"x-trace": ["a", "b"]},
            "body": "b2s="
        }))
        .unwrap();

        let response = envelope.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.body().as_ref(), b"ok");
        assert_eq!(response.headers().get_all("x-trace").iter().count(), 2);
    }

    #[test]
    fn test_missing_body_is_empty() {
        let envelope: ResponseEnvelope =
            serde_json::from_value(json!({"statusCode": 204, "body": null})).unwrap();
        assert!(envelope.body.is_empty());
        assert!(envelope.headers.is_empty());
    }

    #[test]
    fn test_invalid_status_and_headers_are_malformed() {
        let envelope = ResponseEnvelope {
            status_code: 42,
            headers: WireHeaders::new(),
            body: Bytes::new(),
        };
        assert!(matches!(
            envelope.into_response(),
            Err(PluginError::MalformedReply { .. })
        ));

        let mut wire = WireHeaders::new();
        wire.insert("bad header".to_string(), vec!["x".to_string()]);
        assert!(from_wire(&wire).is_err());
    }

    #[test]
    fn test_bad_base64_rejected() {
        let result: Result<ResponseEnvelope, _> =
            serde_json::from_value(json!({"statusCode": 200, "body": "%%%"}));
        assert!(result.is_err());
    }
}
