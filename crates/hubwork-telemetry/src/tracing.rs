//! Distributed tracing with OpenTelemetry.
//!
//! The W3C `traceparent`/`tracestate` propagator is always installed, so a
//! caller's trace context flows through the hub to remote upstreams even when
//! spans are not exported. With `enabled` set, spans are batched to an OTLP
//! collector.
//!
//! ```rust,ignore
//! use hubwork_telemetry::tracing::{init_tracing, TracingConfig};
//!
//! let provider = init_tracing(&TracingConfig {
//!     enabled: true,
//!     ..TracingConfig::default()
//! })?;
//! ```

use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, TracerProvider};
use opentelemetry_sdk::Resource;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Instrumentation scope of every span the hub starts.
pub const TRACER_NAME: &str = "hubwork";

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    /// Export spans to the OTLP collector.
    pub enabled: bool,

    /// OTLP endpoint (e.g., `http://localhost:4317`).
    pub otlp_endpoint: String,

    /// Service name for spans.
    pub service_name: String,

    /// Service version.
    pub service_version: String,

    /// Deployment environment.
    pub environment: String,

    /// Sampling ratio for root spans (0.0 to 1.0).
    pub sample_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "hubwork".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            sample_ratio: 1.0,
        }
    }
}

impl TracingConfig {
    /// Exporting configuration with 10% root sampling.
    #[must_use]
    pub fn production(service_name: &str, version: &str) -> Self {
        Self {
            enabled: true,
            service_name: service_name.to_string(),
            service_version: version.to_string(),
            environment: "production".to_string(),
            sample_ratio: 0.1,
            ..Self::default()
        }
    }
}

/// Installs the W3C trace-context propagator as the global propagator.
pub fn install_propagator() {
    global::set_text_map_propagator(TraceContextPropagator::new());
}

/// Installs the propagator and a global tracer provider.
///
/// The provider always generates span ids; only with `enabled` does it get
/// an OTLP batch exporter, which needs a tokio runtime.
pub fn init_tracing(config: &TracingConfig) -> TelemetryResult<TracerProvider> {
    install_propagator();

    let resource = Resource::new([
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
            config.service_name.clone(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_VERSION,
            config.service_version.clone(),
        ),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ]);

    let root = if config.sample_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if config.sample_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(config.sample_ratio)
    };

    let mut builder = TracerProvider::builder()
        .with_sampler(Sampler::ParentBased(Box::new(root)))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource);

    if config.enabled {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp_endpoint)
            .build()
            .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;
        builder = builder.with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio);
        tracing::info!(endpoint = %config.otlp_endpoint, "span export enabled");
    }

    let provider = builder.build();
    global::set_tracer_provider(provider.clone());
    Ok(provider)
}

/// Flushes and shuts down the global tracer provider.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}

/// Returns a tracer for creating spans.
#[must_use]
pub fn tracer(name: &'static str) -> global::BoxedTracer {
    global::tracer(name)
}

/// Extracts trace context from HTTP headers.
pub fn extract_context<T: opentelemetry::propagation::Extractor>(headers: &T) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(headers))
}

/// Injects trace context into HTTP headers.
pub fn inject_context<T: opentelemetry::propagation::Injector>(context: &Context, headers: &mut T) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(context, headers);
    });
}

/// Writes the current context's span into `headers`.
///
/// Nothing is written when no valid span is active.
pub fn inject_current(headers: &mut http::HeaderMap) {
    inject_context(&Context::current(), &mut HeaderInjector(headers));
}

/// Starts a server span parented on the trace context carried by `headers`.
///
/// The returned context holds the span; end it with [`finish_span`].
pub fn start_server_span(
    name: &'static str,
    headers: &http::HeaderMap,
    attributes: Vec<KeyValue>,
) -> Context {
    let parent = extract_context(&HeaderExtractor(headers));
    start_span(name, &parent, SpanKind::Server, attributes)
}

/// Starts a span of `kind` under `parent`.
pub fn start_span(
    name: &'static str,
    parent: &Context,
    kind: SpanKind,
    attributes: Vec<KeyValue>,
) -> Context {
    let tracer = tracer(TRACER_NAME);
    let span = tracer
        .span_builder(name)
        .with_kind(kind)
        .with_attributes(attributes)
        .start_with_context(&tracer, parent);
    parent.with_span(span)
}

/// Sets the span status from `error` and ends the span held by `context`.
pub fn finish_span(context: &Context, error: Option<&str>) {
    let span = context.span();
    match error {
        Some(message) => span.set_status(Status::error(message.to_string())),
        None => span.set_status(Status::Ok),
    }
    span.end();
}

/// Hex trace id of the context's span, when it has a valid one.
pub fn trace_id(context: &Context) -> Option<String> {
    let span = context.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}

/// HTTP header extractor for `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl opentelemetry::propagation::Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(http::HeaderName::as_str).collect()
    }
}

/// HTTP header injector for `http::HeaderMap`.
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl opentelemetry::propagation::Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(val)) = (
            http::header::HeaderName::try_from(key),
            http::header::HeaderValue::try_from(&value),
        ) {
            self.0.insert(name, val);
        }
    }
}
