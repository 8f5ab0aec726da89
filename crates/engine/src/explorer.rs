//! Function discovery.
//!
//! The explorer walks every instance the host knows about, providers first,
//! and registers each method that carries function metadata. A pass never
//! fails as a whole: per-method problems are logged and reported, and an
//! unavailable instance source aborts the pass with a logged warning.

use std::sync::Arc;

use serde::Serialize;
use stepwire_registry::{InstanceDiscovery, InstanceWrapper, MetadataRegistry, MethodKey};
use stepwire_telemetry::ExecutionRecorder;
use tracing::{debug, error, info, warn};

use crate::{error::ExplorerError, handler::MethodBinding, service::StepwireService};

/// A method that had function metadata but could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryFailure {
    pub type_name: String,
    pub method: String,
    pub error: String,
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    /// Ids of the functions registered by this pass.
    pub registered: Vec<String>,
    pub failed: Vec<DiscoveryFailure>,
    /// Set when the instance source could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl DiscoveryReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_none()
    }
}

/// Scans instances and registers their workflow functions.
pub struct FunctionExplorer {
    discovery: Arc<dyn InstanceDiscovery>,
    registry: MetadataRegistry,
    service: StepwireService,
    recorder: Option<Arc<dyn ExecutionRecorder>>,
}

impl FunctionExplorer {
    pub fn new(discovery: Arc<dyn InstanceDiscovery>, registry: MetadataRegistry, service: StepwireService) -> Self {
        Self {
            discovery,
            registry,
            service,
            recorder: None,
        }
    }

    /// Record executions and registrations into `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn ExecutionRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn service(&self) -> &StepwireService {
        &self.service
    }

    /// Module-init hook: run one discovery pass.
    pub async fn on_module_init(&self) -> DiscoveryReport {
        self.explore().await
    }

    pub async fn explore(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let instances = match self.discovery.instances() {
            Ok(instances) => instances,
            Err(err) => {
                error!(error = %err, "instance registry unavailable; function discovery skipped");
                report.aborted = Some(err.to_string());
                return report;
            }
        };

        for wrapper in &instances {
            for method in wrapper.methods.method_names() {
                match self.register_method(wrapper, method) {
                    Ok(Some(function_id)) => report.registered.push(function_id),
                    Ok(None) => {}
                    Err(err) => {
                        error!(instance = wrapper.name(), method, error = %err, "failed to register workflow function");
                        report.failed.push(DiscoveryFailure {
                            type_name: wrapper.name().to_string(),
                            method: method.to_string(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            instances = instances.len(),
            registered = report.registered.len(),
            failed = report.failed.len(),
            "discovered {} workflow function(s)",
            report.registered.len()
        );
        report
    }

    /// Register one method. `Ok(None)` when the method is not a workflow function.
    fn register_method(&self, wrapper: &InstanceWrapper, method: &str) -> Result<Option<String>, ExplorerError> {
        let key = MethodKey::new(wrapper.type_id, wrapper.type_name, method);
        let Some(metadata) = self.registry.get(&key)?.filter(|metadata| metadata.is_function()) else {
            return Ok(None);
        };

        let Some(entry) = wrapper.methods.method(method).cloned() else {
            return Ok(None);
        };
        if let Some(declared) = metadata.shape
            && declared != entry.shape()
        {
            return Err(ExplorerError::ShapeMismatch {
                method: key.to_string(),
                declared,
                actual: entry.shape(),
            });
        }

        let mut options = metadata.merged();
        let function_id = options
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{}.{method}", wrapper.name()));
        options.id = Some(function_id.clone());

        let middleware = self.registry.middleware_for(&key)?;
        if !middleware.is_empty() {
            debug!(function_id = %function_id, count = middleware.len(), "attaching middleware");
            options.middleware = Some(middleware);
        }

        let handler = MethodBinding {
            function_id: function_id.clone(),
            instance: Arc::clone(&wrapper.instance),
            entry,
            recorder: self.recorder.clone(),
            include_event_data: self.service.options().tracing.include_event_data.unwrap_or(false),
        }
        .into_handler();
        self.service.create_function(options, handler)?;

        if let Some(recorder) = &self.recorder
            && let Err(err) = recorder.register_function(&function_id)
        {
            warn!(function_id = %function_id, error = %err, "failed to register function for monitoring");
        }

        debug!(function_id = %function_id, instance = wrapper.name(), method, "workflow function registered");
        Ok(Some(function_id))
    }
}
