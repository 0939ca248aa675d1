use async_trait::async_trait;
use hubwork_core::{decode_config, CanonicalRequest, ExecContext, HubResult, Task};
use hubwork_telemetry::tracing::{
    extract_context, finish_span, inject_context, start_span, trace_id, HeaderExtractor,
    HeaderInjector,
};
use opentelemetry::trace::{SpanKind, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
struct InitiateTraceConfig {
    name: Option<String>,
}

/// Starts a span for the request and writes its context into the request's
/// `traceparent` header, so forwarded copies of the request join the trace.
///
/// The span's parent is the active trace when there is one, otherwise the
/// trace context already carried by the request headers. Without either a new
/// trace begins.
#[derive(Debug, Clone)]
pub struct InitiateTraceTask {
    name: String,
}

impl Default for InitiateTraceTask {
    fn default() -> Self {
        Self {
            name: Self::TYPE.to_string(),
        }
    }
}

impl InitiateTraceTask {
    /// Registered type name.
    pub const TYPE: &'static str = "initiate_trace";

    /// Factory entry point.
    pub fn from_config(config: &Value) -> HubResult<Self> {
        let config: InitiateTraceConfig = decode_config(Self::TYPE, config)?;
        let mut task = Self::default();
        if let Some(name) = config.name {
            task.name = name;
        }
        Ok(task)
    }
}

#[async_trait]
impl Task for InitiateTraceTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, _ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        let current = Context::current();
        let parent = if current.span().span_context().is_valid() {
            current
        } else {
            extract_context(&HeaderExtractor(request.headers()))
        };

        let span = start_span(
            "initiate_trace",
            &parent,
            SpanKind::Internal,
            vec![
                KeyValue::new("request.id", request.id().to_string()),
                KeyValue::new("api.name", request.api_name().to_string()),
                KeyValue::new("service.name", request.service_name().to_string()),
            ],
        );
        inject_context(&span, &mut HeaderInjector(request.headers_mut()));
        tracing::debug!(
            task = %self.name,
            request_id = %request.id(),
            trace_id = ?trace_id(&span),
            "trace context written to request"
        );
        finish_span(&span, None);
        Ok(())
    }
}
