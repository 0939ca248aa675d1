//! Turns hub documents into a live [`Hub`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hubwork_core::{
    routing_key, Handler, HttpMethod, Hub, HubResult, Registries, Service, Workflow, WorkflowStep,
};

use crate::catalog::SchemaCatalog;
use crate::definition::{AggregateSpec, HandlerSpec, HubDefinition, HubDocuments, StepSpec};
use crate::ConfigError;

/// A compiled application: the hub plus what was read alongside it.
#[derive(Debug)]
pub struct LoadedHub {
    /// Routing table and dispatcher.
    pub hub: Hub,
    /// Contents of `hub.yaml`.
    pub definition: HubDefinition,
    /// Registered schema documents.
    pub schemas: SchemaCatalog,
}

/// Reads the documents under `home` and compiles them into a new hub.
///
/// Every task and target type named by the documents must already be in
/// `registries`.
pub fn load_hub(home: impl AsRef<Path>, registries: &Registries) -> Result<LoadedHub, ConfigError> {
    let documents = HubDocuments::read(home)?;
    let definition = documents.hub.spec.clone();

    let mut hub = Hub::new(definition.application_name.clone());
    if let Some(version) = &definition.application_version {
        hub = hub.with_version(version.clone());
    }
    let schemas = configure_hub(&hub, &documents, registries)?;

    tracing::info!(
        application = %definition.application_name,
        services = hub.service_count(),
        schemas = schemas.len(),
        "hub configured"
    );
    Ok(LoadedHub {
        hub,
        definition,
        schemas,
    })
}

/// Compiles `documents` and adds the resulting services to `hub`.
///
/// All aggregates are compiled before any service is added, so a failure
/// leaves the hub untouched.
pub fn configure_hub(
    hub: &Hub,
    documents: &HubDocuments,
    registries: &Registries,
) -> Result<SchemaCatalog, ConfigError> {
    let mut schemas = SchemaCatalog::new();
    let schema_dir = documents.home.join("schemas");
    for (_, list) in &documents.schemas {
        schemas.load_list(&schema_dir, list)?;
    }

    let compiler = HubCompiler::new(registries);
    let mut services: BTreeMap<String, Service> = BTreeMap::new();
    for (path, aggregate) in &documents.aggregates {
        let spec = &aggregate.spec;
        tracing::debug!(path = %path.display(), aggregate = %spec.name, "compiling aggregate");

        if !documents.hub.spec.apis.is_empty()
            && !documents
                .hub
                .spec
                .apis
                .iter()
                .any(|api| api.name.eq_ignore_ascii_case(&spec.api_name))
        {
            tracing::warn!(api = %spec.api_name, aggregate = %spec.name, "aggregate API not declared in hub document");
        }
        if let (Some(name), Some(version)) = (&spec.schema_name, &spec.schema_version) {
            if !schemas.is_empty() && !schemas.contains(name, version) {
                tracing::warn!(schema = %SchemaCatalog::key(name, version), aggregate = %spec.name, "aggregate references unknown schema");
            }
        }

        let key = routing_key(&spec.api_name, &spec.name);
        let existing = services.remove(&key);
        let service = compiler.compile_into(existing, aggregate)?;
        services.insert(key, service);
    }

    for service in services.into_values() {
        hub.add_service(service);
    }
    Ok(schemas)
}

/// Builds services, handlers and workflows from their documents.
#[derive(Debug, Clone, Copy)]
pub struct HubCompiler<'a> {
    registries: &'a Registries,
}

impl<'a> HubCompiler<'a> {
    /// Creates a compiler resolving plugins from `registries`.
    pub fn new(registries: &'a Registries) -> Self {
        Self { registries }
    }

    /// Compiles one aggregate into a new service.
    pub fn compile_aggregate(&self, aggregate: &AggregateSpec) -> Result<Service, ConfigError> {
        self.compile_into(None, aggregate)
    }

    /// Compiles one aggregate on top of `existing`, which keeps the handlers
    /// the aggregate does not redefine.
    pub fn compile_into(
        &self,
        existing: Option<Service>,
        aggregate: &AggregateSpec,
    ) -> Result<Service, ConfigError> {
        let spec = &aggregate.spec;
        if spec.name.is_empty() || spec.api_name.is_empty() {
            return Err(ConfigError::invalid_value(
                "aggregate.spec",
                "name and apiName are required",
            ));
        }

        let mut service = existing
            .unwrap_or_else(|| Service::new(spec.api_name.clone(), spec.name.clone()))
            .with_public(spec.is_public);
        if let Some(schema) = &spec.schema_name {
            service = service.with_schema(
                schema.clone(),
                spec.schema_version.clone().unwrap_or_default(),
            );
        }
        if let Some(ms) = spec.timeout_ms.filter(|ms| *ms > 0) {
            service = service.with_timeout(Duration::from_millis(ms));
        }

        for (index, handler_spec) in spec.handlers.iter().enumerate() {
            let label = format!("#{index} [{}]", handler_spec.methods.join(", "));
            if handler_spec.methods.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("aggregate {} handler {label}", spec.name),
                    "at least one method is required",
                ));
            }

            let (methods, handler) = self
                .compile_handler(handler_spec)
                .map_err(|err| ConfigError::handler(&spec.name, &label, err))?;
            let handler = Arc::new(handler);
            for method in methods {
                if service.set_handler(method, Arc::clone(&handler)).is_some() {
                    tracing::debug!(aggregate = %spec.name, %method, "handler replaced");
                }
            }
        }

        Ok(service)
    }

    /// Resolves a handler's methods, workflows and target.
    pub fn compile_handler(&self, spec: &HandlerSpec) -> HubResult<(Vec<HttpMethod>, Handler)> {
        let methods = spec
            .methods
            .iter()
            .map(|m| m.parse::<HttpMethod>())
            .collect::<HubResult<Vec<_>>>()?;

        let mut builder = Handler::builder()
            .inbound(self.compile_workflow(&spec.inbound)?)
            .outbound(self.compile_workflow(&spec.outbound)?);
        if let Some(target) = &spec.target {
            let instance = self
                .registries
                .targets
                .resolve(&target.target_type, &target.config)?;
            builder = builder
                .target(instance)
                .target_info(target.name.clone(), target.target_type.clone());
        }

        Ok((methods, builder.build()))
    }

    /// Resolves every enabled step.
    pub fn compile_workflow(&self, steps: &[StepSpec]) -> HubResult<Workflow> {
        let mut workflow = Workflow::new();
        for step in steps {
            if !step.enabled {
                tracing::debug!(step = %step.name, "skipping disabled step");
                continue;
            }
            let task = self.registries.tasks.resolve(&step.task_type, &step.config)?;
            let mut compiled = WorkflowStep::new(step.name.clone(), step.precedence, task)
                .with_task_type(step.task_type.clone());
            if let Some(description) = &step.description {
                compiled = compiled.with_description(description.clone());
            }
            workflow.push(compiled);
        }
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{AggregateDefinition, TargetSpec};
    use hubwork_core::fixtures::{EchoTarget, MarkerTask};
    use hubwork_core::{HubError, Target, Task};
    use serde_json::{json, Value};

    fn registries() -> Registries {
        let registries = Registries::new();
        registries.tasks.register("marker", |config: &Value| {
            let marker = config["marker"].as_str().unwrap_or("?").to_string();
            Ok(Arc::new(MarkerTask::new(marker)) as Arc<dyn Task>)
        });
        registries
            .targets
            .register("echo", |_: &Value| Ok(EchoTarget::new() as Arc<dyn Target>));
        registries
    }

    fn step(name: &str, precedence: i32, marker: &str) -> StepSpec {
        StepSpec {
            name: name.to_string(),
            task_type: "marker".to_string(),
            description: None,
            precedence,
            execution_type: None,
            must_finish: false,
            on_error: None,
            enabled: true,
            config: json!({ "marker": marker }),
        }
    }

    fn aggregate(handlers: Vec<HandlerSpec>) -> AggregateSpec {
        AggregateSpec {
            spec: AggregateDefinition {
                name: "orders".to_string(),
                api_name: "shop".to_string(),
                timeout_ms: Some(250),
                handlers,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn echo_handler(methods: &[&str]) -> HandlerSpec {
        HandlerSpec {
            methods: methods.iter().map(ToString::to_string).collect(),
            target: Some(TargetSpec {
                name: "echo".to_string(),
                target_type: "echo".to_string(),
                config: Value::Null,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_aggregate() {
        let registries = registries();
        let service = HubCompiler::new(&registries)
            .compile_aggregate(&aggregate(vec![echo_handler(&["get", "POST"])]))
            .unwrap();

        assert_eq!(service.routing_key(), "shop/orders");
        assert_eq!(service.methods(), vec![HttpMethod::Get, HttpMethod::Post]);
        assert_eq!(service.timeout(), Some(Duration::from_millis(250)));
        assert!(Arc::ptr_eq(
            service.handler(HttpMethod::Get).unwrap(),
            service.handler(HttpMethod::Post).unwrap()
        ));
        assert_eq!(
            service.handler(HttpMethod::Get).unwrap().target_type(),
            Some("echo")
        );
    }

    #[test]
    fn test_disabled_steps_skipped() {
        let registries = registries();
        let mut disabled = step("off", 0, "X");
        disabled.enabled = false;
        disabled.task_type = "not_registered".to_string();

        let workflow = HubCompiler::new(&registries)
            .compile_workflow(&[step("b", 2, "B"), disabled, step("a", 1, "A")])
            .unwrap();
        let names: Vec<&str> = workflow.steps().map(WorkflowStep::name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_task_names_aggregate_and_handler() {
        let registries = registries();
        let mut handler = echo_handler(&["GET"]);
        let mut bad = step("audit", 0, "");
        bad.task_type = "audit_log".to_string();
        handler.outbound.push(bad);

        let err = HubCompiler::new(&registries)
            .compile_aggregate(&aggregate(vec![handler]))
            .unwrap_err();
        match &err {
            ConfigError::Aggregate {
                aggregate,
                handler,
                source,
            } => {
                assert_eq!(aggregate, "orders");
                assert_eq!(handler.as_deref(), Some("#0 [GET]"));
                assert!(matches!(source, HubError::TaskNotRegistered { name } if name == "audit_log"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_method_rejected() {
        let registries = registries();
        let err = HubCompiler::new(&registries)
            .compile_aggregate(&aggregate(vec![echo_handler(&["BREW"])]))
            .unwrap_err();
        assert!(err.to_string().contains("BREW"));
    }

    #[test]
    fn test_handler_without_methods_rejected() {
        let registries = registries();
        let err = HubCompiler::new(&registries)
            .compile_aggregate(&aggregate(vec![echo_handler(&[])]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_handler_without_target_compiles() {
        let registries = registries();
        let mut handler = echo_handler(&["DELETE"]);
        handler.target = None;
        let service = HubCompiler::new(&registries)
            .compile_aggregate(&aggregate(vec![handler]))
            .unwrap();
        assert!(service.handler(HttpMethod::Delete).unwrap().target().is_none());
    }

    #[test]
    fn test_repeated_aggregate_merges_handlers() {
        let registries = registries();
        let compiler = HubCompiler::new(&registries);
        let first = compiler
            .compile_aggregate(&aggregate(vec![echo_handler(&["GET"])]))
            .unwrap();
        let merged = compiler
            .compile_into(Some(first), &aggregate(vec![echo_handler(&["PUT"])]))
            .unwrap();
        assert_eq!(merged.methods(), vec![HttpMethod::Get, HttpMethod::Put]);
    }
}
