//! Built-in workflow tasks.

mod initiate_trace;
mod log_writer;
mod remote_http;
mod request_logger;
mod response_logger;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

pub use initiate_trace::InitiateTraceTask;
pub use log_writer::{LogField, LogWriterConfig, LogWriterTask};
pub use remote_http::RemoteHttpTask;
pub use request_logger::RequestLoggerTask;
pub use response_logger::ResponseLoggerTask;

/// Level at which a logging task emits its line.
///
/// Accepts the usual names in any case; `WARNING` is read as `Warn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    /// `trace`
    Trace,
    /// `debug`
    Debug,
    /// `info`
    #[default]
    Info,
    /// `warn`
    Warn,
    /// `error`
    Error,
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("unknown log level {value:?}")),
        }
    }
}

/// Emits an event at a runtime-selected [`LogLevel`].
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            $crate::tasks::LogLevel::Trace => tracing::trace!($($arg)+),
            $crate::tasks::LogLevel::Debug => tracing::debug!($($arg)+),
            $crate::tasks::LogLevel::Info => tracing::info!($($arg)+),
            $crate::tasks::LogLevel::Warn => tracing::warn!($($arg)+),
            $crate::tasks::LogLevel::Error => tracing::error!($($arg)+),
        }
    };
}
pub(crate) use log_at;

/// Body as JSON when it parses, otherwise as lossy text.
pub(crate) fn body_value(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Headers as a JSON object, repeated values joined with `, `.
pub(crate) fn headers_value(headers: &http::HeaderMap) -> Value {
    let mut object = serde_json::Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        object.insert(name.as_str().to_string(), Value::String(joined));
    }
    Value::Object(object)
}

/// JSON description of a response for log lines.
pub(crate) fn response_value(response: &hubwork_core::CanonicalResponse) -> Value {
    let status = response.status();
    serde_json::json!({
        "statusCode": status.as_u16(),
        "status": status.canonical_reason().unwrap_or_default(),
        "headers": headers_value(response.headers()),
        "body": body_value(response.body()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderValue, ACCEPT};
    use serde_json::json;

    #[test]
    fn test_log_level_parsing() {
        let level: LogLevel = serde_json::from_value(json!("WARNING")).unwrap();
        assert_eq!(level, LogLevel::Warn);
        let level: LogLevel = serde_json::from_value(json!("Debug")).unwrap();
        assert_eq!(level, LogLevel::Debug);
        assert!(serde_json::from_value::<LogLevel>(json!("loud")).is_err());
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_body_value_prefers_json() {
        assert_eq!(body_value(&Bytes::from_static(br#"{"a":1}"#)), json!({"a": 1}));
        assert_eq!(body_value(&Bytes::from_static(b"plain")), json!("plain"));
        assert_eq!(body_value(&Bytes::new()), Value::Null);
    }

    #[test]
    fn test_repeated_headers_joined() {
        let mut headers = http::HeaderMap::new();
        headers.append(ACCEPT, HeaderValue::from_static("text/html"));
        headers.append(ACCEPT, HeaderValue::from_static("application/json"));
        assert_eq!(
            headers_value(&headers),
            json!({"accept": "text/html, application/json"})
        );
    }
}
