use async_trait::async_trait;
use hubwork_core::{decode_config, CanonicalRequest, ExecContext, HubResult, Task};
use serde::Deserialize;
use serde_json::Value;

use super::{log_at, response_value, LogLevel};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ResponseLoggerConfig {
    name: Option<String>,
    log_level: LogLevel,
}

/// Logs the response attached to the request. Meant for outbound workflows.
#[derive(Debug, Clone)]
pub struct ResponseLoggerTask {
    name: String,
    level: LogLevel,
}

impl ResponseLoggerTask {
    /// Registered type name.
    pub const TYPE: &'static str = "response_logger";

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
        let config: ResponseLoggerConfig = decode_config(Self::TYPE, config)?;
        let mut task = Self::new(config.log_level);
        if let Some(name) = config.name {
            task.name = name;
        }
        Ok(task)
    }
}

#[async_trait]
impl Task for ResponseLoggerTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, _ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        match request.response() {
            Some(response) => {
                let record = response_value(response);
                log_at!(self.level, task = %self.name, request_id = %request.id(), response = %record, "response log");
            }
            None => {
                log_at!(self.level, task = %self.name, request_id = %request.id(), "no response available to log");
            }
        }
        Ok(())
    }
}
