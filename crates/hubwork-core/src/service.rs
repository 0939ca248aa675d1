//! Services and their per-method handlers.
//!
//! A [`Service`] is addressed by `{api}/{service}` and maps each supported
//! method to a [`Handler`]. Dispatch walks one handler:
//!
//! ```text
//!  inbound workflow → target → attach response → outbound workflow
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::ExecContext;
use crate::error::{HubError, HubResult};
use crate::method::HttpMethod;
use crate::plugin::Target;
use crate::request::{routing_key, CanonicalRequest};
use crate::workflow::Workflow;

/// Workflows and target bound to one or more methods of a service.
#[derive(Clone, Default)]
pub struct Handler {
    inbound: Option<Workflow>,
    outbound: Option<Workflow>,
    target: Option<Arc<dyn Target>>,
    target_name: Option<String>,
    target_type: Option<String>,
}

impl Handler {
    /// Starts building a handler.
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::default()
    }

    /// Workflow run before the target; `None` means skip.
    pub fn inbound(&self) -> Option<&Workflow> {
        self.inbound.as_ref()
    }

    /// Workflow run after the target; `None` means skip.
    pub fn outbound(&self) -> Option<&Workflow> {
        self.outbound.as_ref()
    }

    /// The terminal operation.
    pub fn target(&self) -> Option<&Arc<dyn Target>> {
        self.target.as_ref()
    }

    /// Configured name of the target.
    pub fn target_name(&self) -> Option<&str> {
        self.target_name.as_deref()
    }

    /// Registry name of the target type.
    pub fn target_type(&self) -> Option<&str> {
        self.target_type.as_deref()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .field("target_name", &self.target_name)
            .field("target_type", &self.target_type)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}

/// Builder for [`Handler`].
#[derive(Default)]
pub struct HandlerBuilder {
    handler: Handler,
}

impl HandlerBuilder {
    /// Sets the inbound workflow.
    #[must_use]
    pub fn inbound(mut self, workflow: Workflow) -> Self {
        self.handler.inbound = Some(workflow);
        self
    }

    /// Sets the outbound workflow.
    #[must_use]
    pub fn outbound(mut self, workflow: Workflow) -> Self {
        self.handler.outbound = Some(workflow);
        self
    }

    /// Sets the target.
    #[must_use]
    pub fn target(mut self, target: Arc<dyn Target>) -> Self {
        self.handler.target = Some(target);
        self
    }

    /// Records the target's configured name and type.
    #[must_use]
    pub fn target_info(mut self, name: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.handler.target_name = Some(name.into());
        self.handler.target_type = Some(target_type.into());
        self
    }

    /// Finishes the handler.
    pub fn build(self) -> Handler {
        self.handler
    }
}

/// A named unit of request handling.
///
/// ```
/// use std::sync::Arc;
/// use hubwork_core::{Handler, HttpMethod, Service};
/// use hubwork_core::fixtures::EchoTarget;
///
/// let handler = Arc::new(Handler::builder().target(EchoTarget::new()).build());
/// let service = Service::new("shop", "cart")
///     .with_handler(HttpMethod::Get, Arc::clone(&handler))
///     .with_handler(HttpMethod::Post, handler);
///
/// assert_eq!(service.routing_key(), "shop/cart");
/// assert_eq!(service.methods(), vec![HttpMethod::Get, HttpMethod::Post]);
/// ```
#[derive(Debug, Clone)]
pub struct Service {
    name: String,
    api_name: String,
    schema_name: Option<String>,
    schema_version: Option<String>,
    is_public: bool,
    timeout: Option<Duration>,
    handlers: HashMap<HttpMethod, Arc<Handler>>,
}

impl Service {
    /// Creates a private service with no handlers.
    pub fn new(api_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_name: api_name.into(),
            schema_name: None,
            schema_version: None,
            is_public: false,
            timeout: None,
            handlers: HashMap::new(),
        }
    }

    /// Records the schema this service documents.
    #[must_use]
    pub fn with_schema(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.schema_name = Some(name.into());
        self.schema_version = Some(version.into());
        self
    }

    /// Marks the service reachable from the public listener.
    #[must_use]
    pub fn with_public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    /// Bounds every dispatch by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Binds `handler` to `method`.
    #[must_use]
    pub fn with_handler(mut self, method: HttpMethod, handler: Arc<Handler>) -> Self {
        self.set_handler(method, handler);
        self
    }

    /// Binds `handler` to `method`, returning the handler it replaced.
    pub fn set_handler(&mut self, method: HttpMethod, handler: Arc<Handler>) -> Option<Arc<Handler>> {
        self.handlers.insert(method, handler)
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// API the service belongs to.
    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    /// Lower-cased `{api}/{service}` key.
    pub fn routing_key(&self) -> String {
        routing_key(&self.api_name, &self.name)
    }

    /// Schema name, if declared.
    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    /// Schema version, if declared.
    pub fn schema_version(&self) -> Option<&str> {
        self.schema_version.as_deref()
    }

    /// Whether the public listener may route here.
    pub fn is_public(&self) -> bool {
        self.is_public
    }

    /// Dispatch timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Handler bound to `method`.
    pub fn handler(&self, method: HttpMethod) -> Option<&Arc<Handler>> {
        self.handlers.get(&method)
    }

    /// Methods with a handler, sorted.
    pub fn methods(&self) -> Vec<HttpMethod> {
        let mut methods: Vec<HttpMethod> = self.handlers.keys().copied().collect();
        methods.sort();
        methods
    }

    /// Runs the handler for the request's method.
    ///
    /// On success the target's response is attached to `request`. When the
    /// outbound workflow fails the response stays attached and the error is
    /// returned.
    pub async fn dispatch(&self, ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        match self.timeout {
            Some(timeout) => {
                let scoped = ctx.child_with_timeout(timeout);
                scoped.run(self.run_handler(&scoped, request)).await
            }
            None => ctx.run(self.run_handler(ctx, request)).await,
        }
    }

    async fn run_handler(&self, ctx: &ExecContext, request: &mut CanonicalRequest) -> HubResult<()> {
        let method = request.method();
        let handler = self
            .handlers
            .get(&method)
            .ok_or_else(|| HubError::method_not_configured(method, &self.name))?;

        if let Some(inbound) = handler.inbound() {
            inbound.apply(ctx, request).await?;
        }

        let target = handler
            .target()
            .ok_or_else(|| HubError::target_not_configured(&self.name))?;
        let response = target
            .apply(ctx, request)
            .await?
            .ok_or_else(|| HubError::empty_response(&self.name))?;
        request.attach_response(response);

        if let Some(outbound) = handler.outbound() {
            outbound.apply(ctx, request).await?;
        }

        Ok(())
    }
}
