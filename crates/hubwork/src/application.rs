//! Application bootstrap: registries, hub documents, telemetry and listeners.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use hubwork_config::{
    load_hub, ConfigError, HubworkConfig, LogFormat, SchemaCatalog, TelemetryConfigSection,
};
use hubwork_core::{Hub, HubResult, Registries, Target, TargetFactory, Task, TaskFactory};
use hubwork_server::{Server, ShutdownSignal};
use hubwork_telemetry::{
    init_telemetry, shutdown_tracing, LogConfig, MetricsConfig, TelemetryConfig, TracingConfig,
};
use serde_json::Value;

use crate::error::ApplicationError;

/// A compiled hub together with the settings it will be served with.
///
/// ```rust,ignore
/// use hubwork::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), ApplicationError> {
///     Application::builder("recipes")
///         .home("/srv/recipes")
///         .with_task("stamp", |_| Ok(Arc::new(Stamp) as Arc<dyn Task>))
///         .build()?
///         .run()
///         .await
/// }
/// ```
#[derive(Debug)]
pub struct Application {
    name: String,
    config: HubworkConfig,
    hub: Arc<Hub>,
    schemas: SchemaCatalog,
    registries: Registries,
}

impl Application {
    /// Starts a builder for the application `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ApplicationBuilder {
        ApplicationBuilder::new(name)
    }

    /// Application name given to the builder.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective settings, with ports and home resolved.
    pub fn config(&self) -> &HubworkConfig {
        &self.config
    }

    /// The compiled hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Schema documents registered from `schemas/`.
    pub fn schemas(&self) -> &SchemaCatalog {
        &self.schemas
    }

    /// Task and target registries the hub was compiled with.
    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Builds (without binding) the listeners for this application.
    pub fn server(&self) -> Result<Server, ApplicationError> {
        Ok(Server::builder()
            .config(&self.config.server)
            .hub(Arc::clone(&self.hub))
            .build()?)
    }

    /// Installs telemetry and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ApplicationError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals())
            .await
    }

    /// Installs telemetry and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ApplicationError> {
        let mut telemetry = telemetry_config(&self.config.telemetry);
        if let Some(version) = self.hub.application_version() {
            telemetry.tracing.service_version = version.to_string();
        }
        init_telemetry(&telemetry)?;
        tracing::info!(
            name = %self.name,
            application = %self.hub.application_name(),
            version = ?self.hub.application_version(),
            home = %self.config.application.home,
            "starting application"
        );
        let served = self.server()?.run_with_shutdown(shutdown).await;
        shutdown_tracing();
        served?;
        Ok(())
    }
}

/// Maps the settings section onto the telemetry crate's configuration.
pub fn telemetry_config(section: &TelemetryConfigSection) -> TelemetryConfig {
    let logging = match section.logging.format {
        LogFormat::Json => LogConfig::production(),
        LogFormat::Pretty => LogConfig::development(),
    };
    TelemetryConfig {
        logging: logging
            .with_level(section.logging.level.clone())
            .with_service_name(section.service_name.clone()),
        tracing: TracingConfig {
            enabled: section.tracing.enabled,
            otlp_endpoint: section.tracing.otlp_endpoint.clone(),
            service_name: section.service_name.clone(),
            environment: section.tracing.environment.clone(),
            sample_ratio: section.tracing.sample_ratio,
            ..TracingConfig::default()
        },
        metrics: MetricsConfig {
            enabled: section.metrics.enabled,
            addr: section.metrics.addr.clone(),
            ..MetricsConfig::default()
        },
    }
}

/// Builder for [`Application`].
pub struct ApplicationBuilder {
    name: String,
    config: HubworkConfig,
    home: Option<PathBuf>,
    public_port: Option<u16>,
    private_port: Option<u16>,
    log_level: Option<String>,
    tasks: Vec<(String, Arc<dyn TaskFactory>)>,
    targets: Vec<(String, Arc<dyn TargetFactory>)>,
}

impl std::fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tasks: Vec<&str> = self.tasks.iter().map(|(name, _)| name.as_str()).collect();
        let targets: Vec<&str> = self.targets.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ApplicationBuilder")
            .field("name", &self.name)
            .field("home", &self.home)
            .field("public_port", &self.public_port)
            .field("private_port", &self.private_port)
            .field("log_level", &self.log_level)
            .field("tasks", &tasks)
            .field("targets", &targets)
            .finish_non_exhaustive()
    }
}

impl ApplicationBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: HubworkConfig::default(),
            home: None,
            public_port: None,
            private_port: None,
            log_level: None,
            tasks: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Base settings; the other builder options override them.
    #[must_use]
    pub fn config(mut self, config: HubworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Directory holding `hub.yaml`.
    #[must_use]
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Public listener port.
    #[must_use]
    pub fn public_port(mut self, port: u16) -> Self {
        self.public_port = Some(port);
        self
    }

    /// Private listener port.
    #[must_use]
    pub fn private_port(mut self, port: u16) -> Self {
        self.private_port = Some(port);
        self
    }

    /// Default log filter.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Registers a custom task type; it replaces a built-in of the same name.
    #[must_use]
    pub fn with_task<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> HubResult<Arc<dyn Task>> + Send + Sync + 'static,
    {
        self.tasks
            .push((name.into(), Arc::new(factory) as Arc<dyn TaskFactory>));
        self
    }

    /// Registers a custom target type; it replaces a built-in of the same name.
    #[must_use]
    pub fn with_target<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> HubResult<Arc<dyn Target>> + Send + Sync + 'static,
    {
        self.targets
            .push((name.into(), Arc::new(factory) as Arc<dyn TargetFactory>));
        self
    }

    /// Registers plugins, reads the hub documents and compiles the hub.
    ///
    /// Ports come from the builder, then `hub.yaml`, then the settings
    /// addresses (3531 public, 3532 private by default).
    pub fn build(self) -> Result<Application, ApplicationError> {
        let registries = Registries::new();
        hubwork_plugins::register_builtins(&registries.tasks, &registries.targets);
        for (name, factory) in self.tasks {
            registries.tasks.register_factory(name, factory);
        }
        for (name, factory) in self.targets {
            registries.targets.register_factory(name, factory);
        }

        let mut config = self.config;
        config.application.name.clone_from(&self.name);
        if let Some(home) = &self.home {
            config.application.home = home.display().to_string();
        }
        if let Some(level) = self.log_level {
            config.telemetry.logging.level = level;
        }

        let loaded = load_hub(&config.application.home, &registries)?;

        if let Some(port) = self.public_port.or(loaded.definition.public_port) {
            config.server.public_addr =
                with_port("server.public_addr", &config.server.public_addr, port)?;
        }
        if let (Some(port), Some(addr)) = (
            self.private_port.or(loaded.definition.private_port),
            config.server.private_addr.as_deref(),
        ) {
            config.server.private_addr = Some(with_port("server.private_addr", addr, port)?);
        }
        config.validate()?;

        Ok(Application {
            name: self.name,
            config,
            hub: Arc::new(loaded.hub),
            schemas: loaded.schemas,
            registries,
        })
    }
}

fn with_port(field: &str, addr: &str, port: u16) -> Result<String, ConfigError> {
    let mut parsed: SocketAddr = addr
        .parse()
        .map_err(|_| ConfigError::invalid_value(field, format!("invalid socket address: {addr}")))?;
    parsed.set_port(port);
    Ok(parsed.to_string())
}
