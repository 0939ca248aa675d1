//! Built-in tasks and targets for Hubwork.
//!
//! | Type name | Kind | Purpose |
//! |-----------|------|---------|
//! | `request_logger` | task | log the in-flight request |
//! | `response_logger` | task | log the attached response |
//! | `log_writer` | task | log templated fields |
//! | `remote_http` | task | enrich the request or response from a remote service |
//! | `initiate_trace` | task | start a span and write `traceparent` into the request |
//! | `noop` | target | echo the request back |
//! | `remote_http` | target | forward to a remote service |
//! | `key_value` | target | in-memory JSON document store |
//!
//! ```
//! use hubwork_core::Registries;
//!
//! let registries = Registries::new();
//! hubwork_plugins::register_builtins(&registries.tasks, &registries.targets);
//! assert!(registries.tasks.contains("log_writer"));
//! assert!(registries.targets.contains("key_value"));
//! ```

#![doc(html_root_url = "https://docs.rs/hubwork-plugins/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod remote;
pub mod targets;
pub mod tasks;

use std::sync::Arc;

use hubwork_core::{Target, TargetRegistry, Task, TaskRegistry};
use serde_json::Value;

pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use error::PluginError;
pub use remote::{RemoteClient, RemoteHttpConfig, RetrySettings};
pub use targets::{KeyValueTarget, NoopTarget, RemoteHttpTarget};
pub use tasks::{
    InitiateTraceTask, LogLevel, LogWriterTask, RemoteHttpTask, RequestLoggerTask,
    ResponseLoggerTask,
};

/// Registers every built-in task and target.
///
/// Registering a name again replaces the earlier factory, so applications
/// can override a built-in by registering their own plugin afterwards.
pub fn register_builtins(tasks: &TaskRegistry, targets: &TargetRegistry) {
    tasks.register(RequestLoggerTask::TYPE, |config: &Value| {
        Ok(Arc::new(RequestLoggerTask::from_config(config)?) as Arc<dyn Task>)
    });
    tasks.register(ResponseLoggerTask::TYPE, |config: &Value| {
        Ok(Arc::new(ResponseLoggerTask::from_config(config)?) as Arc<dyn Task>)
    });
    tasks.register(LogWriterTask::TYPE, |config: &Value| {
        Ok(Arc::new(LogWriterTask::from_config(config)?) as Arc<dyn Task>)
    });
    tasks.register(RemoteHttpTask::TYPE, |config: &Value| {
        Ok(Arc::new(RemoteHttpTask::from_config(config)?) as Arc<dyn Task>)
    });
    tasks.register(InitiateTraceTask::TYPE, |config: &Value| {
        Ok(Arc::new(InitiateTraceTask::from_config(config)?) as Arc<dyn Task>)
    });

    targets.register(NoopTarget::TYPE, |_: &Value| {
        Ok(Arc::new(NoopTarget) as Arc<dyn Target>)
    });
    targets.register(RemoteHttpTarget::TYPE, |config: &Value| {
        Ok(Arc::new(RemoteHttpTarget::from_config(config)?) as Arc<dyn Target>)
    });
    targets.register(KeyValueTarget::TYPE, |config: &Value| {
        Ok(Arc::new(KeyValueTarget::from_config(config)?) as Arc<dyn Target>)
    });

    tracing::debug!(
        tasks = tasks.len(),
        targets = targets.len(),
        "built-in plugins registered"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_builtins_registered() {
        let tasks = TaskRegistry::new();
        let targets = TargetRegistry::new();
        register_builtins(&tasks, &targets);

        let mut task_names = tasks.names();
        task_names.sort();
        assert_eq!(
            task_names,
            [
                "initiate_trace",
                "log_writer",
                "remote_http",
                "request_logger",
                "response_logger"
            ]
        );
        let mut target_names = targets.names();
        target_names.sort();
        assert_eq!(target_names, ["key_value", "noop", "remote_http"]);
    }

    #[test]
    fn test_factories_validate_config() {
        let tasks = TaskRegistry::new();
        let targets = TargetRegistry::new();
        register_builtins(&tasks, &targets);

        assert!(tasks.resolve("request_logger", &Value::Null).is_ok());
        assert!(tasks.resolve("remote_http", &Value::Null).is_err());
        assert!(targets
            .resolve("remote_http", &json!({"host": "http://127.0.0.1:1"}))
            .is_ok());
        assert!(targets.resolve("key_value", &json!({"idField": ""})).is_err());
    }
}
