//! Supported request methods.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// The closed set of HTTP methods a hub accepts.
///
/// Parsing is case-insensitive; the canonical form is upper case.
///
/// ```
/// use hubwork_core::HttpMethod;
///
/// let method: HttpMethod = "patch".parse().unwrap();
/// assert_eq!(method, HttpMethod::Patch);
/// assert_eq!(method.to_string(), "PATCH");
/// assert!("BREW".parse::<HttpMethod>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `PATCH`
    Patch,
    /// `TRACE`
    Trace,
    /// `CONNECT`
    Connect,
}

impl HttpMethod {
    /// Every supported method, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Head,
        Self::Options,
        Self::Patch,
        Self::Trace,
        Self::Connect,
    ];

    /// Returns the canonical upper-case token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }

    /// Converts to the `http` crate's method type.
    #[must_use]
    pub fn as_http(&self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
            Self::Put => http::Method::PUT,
            Self::Delete => http::Method::DELETE,
            Self::Head => http::Method::HEAD,
            Self::Options => http::Method::OPTIONS,
            Self::Patch => http::Method::PATCH,
            Self::Trace => http::Method::TRACE,
            Self::Connect => http::Method::CONNECT,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| HubError::unsupported_method(s))
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = HubError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&http::Method> for HttpMethod {
    type Error = HubError;

    fn try_from(value: &http::Method) -> Result<Self, Self::Error> {
        value.as_str().parse()
    }
}

impl From<HttpMethod> for &'static str {
    fn from(method: HttpMethod) -> Self {
        method.as_str()
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        method.as_http()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        for method in HttpMethod::ALL {
            let lower = method.as_str().to_lowercase();
            assert_eq!(lower.parse::<HttpMethod>().unwrap(), method);
            assert_eq!(method.as_str().parse::<HttpMethod>().unwrap(), method);
        }
        assert_eq!("dElEtE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
    }

    #[test]
    fn test_unknown_token_is_rejected() {
        let err = "PROPFIND".parse::<HttpMethod>().unwrap_err();
        assert!(matches!(err, HubError::UnsupportedMethod { ref method } if method == "PROPFIND"));
        assert!("".parse::<HttpMethod>().is_err());
        assert!(" GET".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_http_round_trip() {
        for method in HttpMethod::ALL {
            assert_eq!(HttpMethod::try_from(&method.as_http()).unwrap(), method);
        }
        let custom = http::Method::from_bytes(b"PURGE").unwrap();
        assert!(HttpMethod::try_from(&custom).is_err());
    }

    #[test]
    fn test_serde_uses_canonical_token() {
        let json = serde_json::to_string(&HttpMethod::Options).unwrap();
        assert_eq!(json, "\"OPTIONS\"");
        let parsed: Vec<HttpMethod> = serde_json::from_str(r#"["get", "Post"]"#).unwrap();
        assert_eq!(parsed, vec![HttpMethod::Get, HttpMethod::Post]);
    }
}
