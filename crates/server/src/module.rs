//! Module construction.
//!
//! A module is built once at startup from a configuration that is supplied
//! directly, produced by an async factory, or produced by an
//! [`OptionsFactory`] implementation. All three paths merge defaults,
//! validate, and then wire the same providers.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use stepwire_config::{StepwireConfig, resolve_config};
use stepwire_engine::{DiscoveryReport, FunctionExplorer, StepwireService};
use stepwire_registry::{InstanceDiscovery, MetadataRegistry};
use stepwire_telemetry::{BackgroundTask, HealthService, MonitoringService, TraceService};
use stepwire_types::MiddlewareHandle;
use tracing::{debug, info};

use crate::error::ModuleError;

/// Produces the configuration for [`StepwireModule::for_root_async_class`].
#[async_trait]
pub trait OptionsFactory: Send + Sync {
    async fn create_options(&self) -> anyhow::Result<StepwireConfig>;
}

/// What the host hands to the module: its instances and their metadata.
#[derive(Clone)]
pub struct ModuleHost {
    pub discovery: Arc<dyn InstanceDiscovery>,
    pub registry: MetadataRegistry,
    /// Applied to every function, before per-function middleware.
    pub client_middleware: Vec<MiddlewareHandle>,
}

impl ModuleHost {
    pub fn new(discovery: Arc<dyn InstanceDiscovery>, registry: MetadataRegistry) -> Self {
        Self {
            discovery,
            registry,
            client_middleware: Vec::new(),
        }
    }

    pub fn with_client_middleware(mut self, middleware: impl IntoIterator<Item = MiddlewareHandle>) -> Self {
        self.client_middleware.extend(middleware);
        self
    }
}

/// Everything the module provides once built.
#[derive(Clone)]
pub struct ModuleProviders {
    pub config: Arc<StepwireConfig>,
    pub service: StepwireService,
    pub explorer: Arc<FunctionExplorer>,
    pub monitoring: Option<MonitoringService>,
    pub health: Option<HealthService>,
    pub tracing: Option<TraceService>,
}

impl ModuleProviders {
    /// On-init hook: run function discovery.
    pub async fn init(&self) -> DiscoveryReport {
        self.explorer.on_module_init().await
    }

    /// Start the periodic metrics and health timers that the config enables.
    pub fn start_background_tasks(&self) -> Vec<BackgroundTask> {
        let mut tasks = Vec::new();
        if let Some(monitoring) = &self.monitoring
            && self.config.monitoring.include_default_metrics.unwrap_or(true)
        {
            let interval = Duration::from_millis(self.config.metrics_interval_ms());
            debug!(interval_ms = self.config.metrics_interval_ms(), "starting metrics collection");
            tasks.push(monitoring.start_collection(interval));
        }
        if let Some(health) = &self.health
            && let Some(interval_ms) = self.config.health.check_interval_ms
        {
            debug!(interval_ms, "starting periodic health checks");
            tasks.push(health.start_checks(Duration::from_millis(interval_ms)));
        }
        tasks
    }
}

/// Entry points for building a module.
pub struct StepwireModule;

impl StepwireModule {
    /// Build from a configuration supplied directly.
    pub fn for_root(host: ModuleHost, config: StepwireConfig) -> Result<ModuleProviders, ModuleError> {
        build(host, config)
    }

    /// Build from a configuration produced by an async factory.
    pub async fn for_root_async<F, Fut>(host: ModuleHost, factory: F) -> Result<ModuleProviders, ModuleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<StepwireConfig>>,
    {
        let config = factory().await.map_err(ModuleError::factory)?;
        build(host, config)
    }

    /// Build from a configuration produced by an [`OptionsFactory`].
    pub async fn for_root_async_class<O: OptionsFactory + ?Sized>(host: ModuleHost, factory: &O) -> Result<ModuleProviders, ModuleError> {
        let config = factory.create_options().await.map_err(ModuleError::factory)?;
        build(host, config)
    }
}

fn build(host: ModuleHost, config: StepwireConfig) -> Result<ModuleProviders, ModuleError> {
    let config = Arc::new(resolve_config(config)?);

    let tracing = config.tracing_enabled().then(|| {
        let service_name = config.tracing.service_name.clone().unwrap_or_else(|| config.id.clone());
        TraceService::new(service_name)
    });
    let service = StepwireService::with_client_middleware(Arc::clone(&config), tracing.clone(), host.client_middleware)?;
    let monitoring = config.monitoring_enabled().then(MonitoringService::new);

    let mut explorer = FunctionExplorer::new(host.discovery, host.registry, service.clone());
    if let Some(monitoring) = &monitoring {
        explorer = explorer.with_recorder(Arc::new(monitoring.clone()));
    }

    let health = config.health_enabled().then(|| {
        let mut health = HealthService::new()
            .with_inventory(Arc::new(service.clone()))
            .include_details(config.health.include_details.unwrap_or(false));
        if let Some(monitoring) = &monitoring {
            health = health.with_monitoring(monitoring.clone());
        }
        health
    });

    info!(
        app_id = %config.id,
        environment = %config.environment,
        monitoring = monitoring.is_some(),
        health = health.is_some(),
        tracing = tracing.is_some(),
        "stepwire module built"
    );
    Ok(ModuleProviders {
        config,
        service,
        explorer: Arc::new(explorer),
        monitoring,
        health,
        tracing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use stepwire_config::{ConfigError, Environment};
    use stepwire_registry::InstanceContainer;

    fn host() -> ModuleHost {
        ModuleHost::new(Arc::new(InstanceContainer::new()), MetadataRegistry::new())
    }

    struct FromVault;

    #[async_trait]
    impl OptionsFactory for FromVault {
        async fn create_options(&self) -> anyhow::Result<StepwireConfig> {
            Ok(StepwireConfig::new("vaulted", Environment::Test))
        }
    }

    #[test]
    fn development_enables_monitoring_and_health() {
        let providers = StepwireModule::for_root(host(), StepwireConfig::new("shop", Environment::Development)).unwrap();
        assert!(providers.monitoring.is_some());
        assert!(providers.health.is_some());
        assert!(providers.tracing.is_none());
        assert_eq!(providers.config.base_url.as_ref().map(|url| url.as_str()), Some("http://localhost:8288/"));
    }

    #[test]
    fn production_without_credentials_fails_fast() {
        let err = StepwireModule::for_root(host(), StepwireConfig::new("shop", Environment::Production))
            .err()
            .unwrap();
        let ModuleError::Config(ConfigError::Validation(validation)) = err else {
            panic!("expected a validation error, got {err}");
        };
        let fields = validation.fields();
        assert!(fields.contains(&"eventKey"));
        assert!(fields.contains(&"signingKey"));
    }

    #[tokio::test]
    async fn async_factory_and_class_modes_build_the_same_providers() {
        let providers = StepwireModule::for_root_async(host(), || async {
            let mut config = StepwireConfig::new("factory", Environment::Development);
            config.tracing.enabled = Some(true);
            Ok::<_, anyhow::Error>(config)
        })
        .await
        .unwrap();
        assert_eq!(providers.config.id, "factory");
        assert_eq!(providers.tracing.as_ref().map(TraceService::service_name), Some("factory"));

        let providers = StepwireModule::for_root_async_class(host(), &FromVault).await.unwrap();
        assert_eq!(providers.config.id, "vaulted");
        assert!(providers.monitoring.is_none());
    }

    #[tokio::test]
    async fn factory_errors_are_reported() {
        let err = StepwireModule::for_root_async(host(), || async { Err::<StepwireConfig, anyhow::Error>(anyhow!("vault sealed")) })
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("vault sealed"));
    }

    #[tokio::test]
    async fn background_tasks_follow_config_and_stop_cleanly() {
        let providers = StepwireModule::for_root(host(), StepwireConfig::new("shop", Environment::Development)).unwrap();
        let tasks = providers.start_background_tasks();
        assert_eq!(tasks.len(), 2);
        for task in tasks {
            task.stop().await;
        }
    }
}
