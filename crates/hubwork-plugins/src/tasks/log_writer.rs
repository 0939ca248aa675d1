use std::borrow::Cow;

use async_trait::async_trait;
use hubwork_core::{decode_config, CanonicalRequest, ExecContext, HubError, HubResult, Task};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

use super::{log_at, LogLevel};
use crate::error::PluginError;

/// One named output field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogField {
    /// Key in the emitted record.
    pub name: String,
    /// Literal text, optionally containing `{{...}}` placeholders.
    pub value: String,
}

/// Configuration of a `log_writer` step.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogWriterConfig {
    /// Instance name.
    pub name: Option<String>,
    /// Emission level.
    pub log_level: LogLevel,
    /// Output fields, in order.
    pub fields: Vec<LogField>,
}

/// Logs a record assembled from literal and templated fields.
///
/// Placeholders:
///
/// | Template | Value |
/// |----------|-------|
/// | `Request.Body` | request body as text |
/// | `Request.Method` | method token |
/// | `Request.URL.Path` | URI path |
/// | `Request.ID` | request identity |
/// | `Request.APIName` / `Request.ServiceName` | routing names |
/// | `Request.Header.<name>` | first value of a header, or empty |
/// | `Response.StatusCode` / `Response.Body` | attached response, or empty |
///
/// Any other placeholder fails the step.
#[derive(Debug, Clone)]
pub struct LogWriterTask {
    name: String,
    level: LogLevel,
    fields: Vec<LogField>,
    placeholder: Regex,
}

impl LogWriterTask {
    /// Registered type name.
    pub const TYPE: &'static str = "log_writer";

    /// Builds a writer from its configuration.
    pub fn new(config: LogWriterConfig) -> HubResult<Self> {
        let placeholder = Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}")
            .map_err(|e| HubError::invalid_plugin_config(Self::TYPE, e.to_string()))?;
        Ok(Self {
            name: config.name.unwrap_or_else(|| Self::TYPE.to_string()),
            level: config.log_level,
            fields: config.fields,
            placeholder,
        })
    }

    /// Factory entry point.
    pub fn from_config(config: &Value) -> HubResult<Self> {
        Self::new(decode_config(Self::TYPE, config)?)
    }

    /// Evaluates every field against `request`.
    pub fn render(&self, request: &CanonicalRequest) -> Result<IndexMap<String, String>, PluginError> {
        let mut record = IndexMap::with_capacity(self.fields.len());
        for field in &self.fields {
            record.insert(field.name.clone(), self.expand(&field.value, request)?);
        }
        Ok(record)
    }

    fn expand(&self, template: &str, request: &CanonicalRequest) -> Result<String, PluginError> {
        let mut failure = None;
        let expanded = self.placeholder.replace_all(template, |caps: &Captures<'_>| {
            match resolve(&caps[1], request) {
                Ok(value) => value.into_owned(),
                Err(err) => {
                    failure.get_or_insert(err);
                    String::new()
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(expanded.into_owned()),
        }
    }
}

fn resolve<'a>(field: &str, request: &'a CanonicalRequest) -> Result<Cow<'a, str>, PluginError> {
    let value = match field {
        "Request.Body" => String::from_utf8_lossy(request.body()),
        "Request.Method" => Cow::Borrowed(request.method().as_str()),
        "Request.URL.Path" => Cow::Borrowed(request.uri().path()),
        "Request.ID" => Cow::Owned(request.id().to_string()),
        "Request.APIName" => Cow::Borrowed(request.api_name()),
        "Request.ServiceName" => Cow::Borrowed(request.service_name()),
        "Response.StatusCode" => request
            .response()
            .map_or(Cow::Borrowed(""), |r| Cow::Owned(r.status().as_u16().to_string())),
        "Response.Body" => request
            .response()
            .map_or(Cow::Borrowed(""), |r| String::from_utf8_lossy(r.body())),
        other => match other.strip_prefix("Request.Header.") {
            Some(name) if !name.is_empty() => request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map_or(Cow::Borrowed(""), Cow::Borrowed),
            _ => {
                return Err(PluginError::UnknownTemplate {
                    field: other.to_string(),
                })
            }
        },
    };
    Ok(value)
}

#[async_trait]
impl Task for LogWriterTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, _ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        let record = self.render(request)?;
        let record = serde_json::to_string(&record).unwrap_or_default();
        log_at!(self.level, task = %self.name, fields = %record, "log writer");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;
    use http::Uri;
    use hubwork_core::HttpMethod;
    use serde_json::json;

    fn request() -> CanonicalRequest {
        CanonicalRequest::builder(HttpMethod::Post, Uri::from_static("/kitchen/recipes/7?x=1"))
            .header(
                http::header::HeaderName::from_static("x-tenant"),
                HeaderValue::from_static("acme"),
            )
            .body("soup")
            .build()
    }

    #[test]
    fn test_fields_render_in_order() {
        let task = LogWriterTask::from_config(&json!({
            "logLevel": "INFO",
            "fields": [
                {"name": "path", "value": "{{Request.URL.Path}}"},
                {"name": "what", "value": "{{ Request.Method }} {{Request.APIName}}/{{Request.ServiceName}}"},
                {"name": "tenant", "value": "{{Request.Header.x-tenant}}"},
                {"name": "body", "value": "{{Request.Body}}"},
                {"name": "status", "value": "{{Response.StatusCode}}"},
                {"name": "static", "value": "constant"}
            ]
        }))
        .unwrap();

        let record = task.render(&request()).unwrap();
        let keys: Vec<_> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, ["path", "what", "tenant", "body", "status", "static"]);
        assert_eq!(record["path"], "/kitchen/recipes/7");
        assert_eq!(record["what"], "POST kitchen/recipes");
        assert_eq!(record["tenant"], "acme");
        assert_eq!(record["body"], "soup");
        assert_eq!(record["status"], "");
        assert_eq!(record["static"], "constant");
    }

    #[tokio::test]
    async fn test_unknown_template_fails_step() {
        let task = LogWriterTask::from_config(&json!({
            "fields": [{"name": "x", "value": "{{Request.Secret}}"}]
        }))
        .unwrap();

        let err = task
            .apply(&ExecContext::new(), &mut request())
            .await
            .unwrap_err();
        assert!(matches!(
            err.plugin_error::<PluginError>(),
            Some(PluginError::UnknownTemplate { field }) if field == "Request.Secret"
        ));
    }

    #[test]
    fn test_missing_fields_block_is_empty_record() {
        let task = LogWriterTask::from_config(&Value::Null).unwrap();
        assert!(task.render(&request()).unwrap().is_empty());
        assert_eq!(task.name(), "log_writer");
    }
}
