use async_trait::async_trait;
use hubwork_core::{decode_config, CanonicalRequest, ExecContext, HubResult, Task};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{body_value, headers_value, log_at, response_value, LogLevel};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RequestLoggerConfig {
    name: Option<String>,
    log_level: LogLevel,
}

/// Logs the method, URI, headers and body of the request, plus the attached
/// response when there is one.
#[derive(Debug, Clone)]
pub struct RequestLoggerTask {
    name: String,
    level: LogLevel,
}

impl RequestLoggerTask {
    /// Registered type name.
    pub const TYPE: &'static str = "request_logger";

    /// Creates a logger emitting at `level`.
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self {
            name: Self::TYPE.to_string(),
            level,
        }
    }

    /// Factory entry point.
    pub fn from_config(config: &Value) -> HubResult<Self> {
        let config: RequestLoggerConfig = decode_config(Self::TYPE, config)?;
        let mut task = Self::new(config.log_level);
        if let Some(name) = config.name {
            task.name = name;
        }
        Ok(task)
    }

    /// The JSON record this task logs for `request`.
    #[must_use]
    pub fn record(request: &CanonicalRequest) -> Value {
        let mut record = json!({
            "id": request.id().to_string(),
            "method": request.method().as_str(),
            "url": request.uri().to_string(),
            "headers": headers_value(request.headers()),
            "body": body_value(request.body()),
        });
        if let Some(response) = request.response() {
            record["response"] = response_value(response);
        }
        record
    }
}

#[async_trait]
impl Task for RequestLoggerTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, _ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        let record = Self::record(request);
        log_at!(self.level, task = %self.name, request = %record, "request log");
        Ok(())
    }
}
