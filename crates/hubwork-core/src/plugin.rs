//! Plugin contracts for workflow tasks and terminal targets.
//!
//! A plugin type is registered under a name together with a factory. While a
//! configuration is compiled the factory receives the free-form config value
//! of one step or target and returns a bound instance.
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde::Deserialize;
//! use hubwork_core::{
//!     decode_config, CanonicalRequest, ExecContext, HubResult, Task, TaskRegistry,
//! };
//!
//! #[derive(Deserialize)]
//! struct StampConfig {
//!     suffix: String,
//! }
//!
//! struct Stamp {
//!     suffix: String,
//! }
//!
//! #[async_trait]
//! impl Task for Stamp {
//!     fn name(&self) -> &str {
//!         "stamp"
//!     }
//!
//!     async fn apply(&self, _ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
//!         let mut body = request.body().to_vec();
//!         body.extend_from_slice(self.suffix.as_bytes());
//!         request.set_body(body);
//!         Ok(())
//!     }
//! }
//!
//! let registry = TaskRegistry::new();
//! registry.register("stamp", |config: &serde_json::Value| {
//!     let config: StampConfig = decode_config("stamp", config)?;
//!     Ok(Arc::new(Stamp { suffix: config.suffix }) as Arc<dyn Task>)
//! });
//! assert!(registry.contains("stamp"));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::ExecContext;
use crate::error::{HubError, HubResult};
use crate::request::CanonicalRequest;
use crate::response::CanonicalResponse;

/// A processing step bound into a workflow.
///
/// Implementations mutate the request (its body, headers or attached
/// response) and report success or a terminal error. They should stop early
/// once `ctx` is cancelled.
#[async_trait]
pub trait Task: Send + Sync {
    /// Name of this instance, for diagnostics.
    fn name(&self) -> &str;

    /// Applies the step to the in-flight request.
    async fn apply(&self, ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()>;
}

/// The terminal operation of a handler.
///
/// The target may rewrite the request; the outbound workflow sees those
/// changes alongside the attached response. Returning `Ok(None)` is a contract violation and surfaces as
/// [`HubError::EmptyResponse`].
#[async_trait]
pub trait Target: Send + Sync {
    /// Produces the response for the request.
    async fn apply(
        &self,
        ctx: &ExecContext,
        request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>>;
}

/// Builds [`Task`] instances from configuration values.
pub trait TaskFactory: Send + Sync {
    /// Creates one task instance.
    fn create(&self, config: &Value) -> HubResult<Arc<dyn Task>>;
}

impl<F> TaskFactory for F
where
    F: Fn(&Value) -> HubResult<Arc<dyn Task>> + Send + Sync,
{
    fn create(&self, config: &Value) -> HubResult<Arc<dyn Task>> {
        self(config)
    }
}

/// Builds [`Target`] instances from configuration values.
pub trait TargetFactory: Send + Sync {
    /// Creates one target instance.
    fn create(&self, config: &Value) -> HubResult<Arc<dyn Target>>;
}

impl<F> TargetFactory for F
where
    F: Fn(&Value) -> HubResult<Arc<dyn Target>> + Send + Sync,
{
    fn create(&self, config: &Value) -> HubResult<Arc<dyn Target>> {
        self(config)
    }
}

/// Decodes a plugin's free-form configuration into a typed struct.
///
/// An absent (`null`) value decodes as an empty object, so structs whose
/// fields all carry defaults accept a missing `config` block.
pub fn decode_config<C: DeserializeOwned>(plugin: &str, config: &Value) -> HubResult<C> {
    let value = if config.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        config.clone()
    };
    serde_json::from_value(value).map_err(|e| HubError::invalid_plugin_config(plugin, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Limits {
        #[serde(default)]
        max_items: u32,
        #[serde(default = "default_label")]
        label: String,
    }

    fn default_label() -> String {
        "none".to_string()
    }

    #[derive(Debug, Deserialize)]
    struct NeedsHost {
        #[allow(dead_code)]
        host: String,
    }

    #[test]
    fn test_decode_null_uses_defaults() {
        let limits: Limits = decode_config("limits", &Value::Null).unwrap();
        assert_eq!(
            limits,
            Limits {
                max_items: 0,
                label: "none".to_string()
            }
        );
    }

    #[test]
    fn test_decode_typed_fields() {
        let limits: Limits =
            decode_config("limits", &json!({"maxItems": 4, "label": "x"})).unwrap();
        assert_eq!(limits.max_items, 4);
        assert_eq!(limits.label, "x");
    }

    #[test]
    fn test_decode_reports_plugin_and_reason() {
        let err = decode_config::<Limits>("limits", &json!({"maxItems": "many"})).unwrap_err();
        match err {
            HubError::InvalidPluginConfig { plugin, reason } => {
                assert_eq!(plugin, "limits");
                assert!(reason.contains("invalid type"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = decode_config::<NeedsHost>("remote", &Value::Null).unwrap_err();
        assert!(err.to_string().contains("missing field `host`"));
    }
}
