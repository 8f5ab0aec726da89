//! Registration service: owns the SDK client and the registered function list.

use std::sync::{Arc, Mutex};

use stepwire_config::StepwireConfig;
use stepwire_sdk::{ClientMode, ClientOptions, FunctionHandler, ServeHandler, ServeOptions, WorkflowClient, WorkflowFunction};
use stepwire_telemetry::{FunctionInventory, TraceContext, TraceService};
use stepwire_types::{FunctionOptions, MiddlewareHandle, SendEventsResult, SendPayload};
use tracing::{debug, error, info};

use crate::error::ServiceError;

/// Holds the SDK client and every function registered through it.
#[derive(Debug, Clone)]
pub struct StepwireService {
    config: Arc<StepwireConfig>,
    client: WorkflowClient,
    functions: Arc<Mutex<Vec<WorkflowFunction>>>,
    tracer: Option<TraceService>,
}

impl StepwireService {
    /// Build the client from a validated configuration.
    ///
    /// Local environments talk to a development executor; production uses
    /// cloud mode.
    pub fn new(config: Arc<StepwireConfig>, tracer: Option<TraceService>) -> Result<Self, ServiceError> {
        Self::with_client_middleware(config, tracer, Vec::new())
    }

    /// Like [`StepwireService::new`], with middleware applied to every function.
    pub fn with_client_middleware(
        config: Arc<StepwireConfig>,
        tracer: Option<TraceService>,
        middleware: Vec<MiddlewareHandle>,
    ) -> Result<Self, ServiceError> {
        let base_url = config.base_url.clone().ok_or_else(|| ServiceError::MissingBaseUrl {
            app_id: config.id.clone(),
        })?;
        let mode = if config.environment.is_local() {
            ClientMode::Dev
        } else {
            ClientMode::Cloud
        };
        let mut options = ClientOptions::new(config.id.clone(), base_url, mode);
        options.event_key = config.event_key.clone();
        options.signing_key = config.signing_key.clone();
        options.middleware = middleware;
        let client = WorkflowClient::new(options)?;

        info!(app_id = %config.id, environment = %config.environment, mode = ?mode, "registration service ready");
        Ok(Self {
            config,
            client,
            functions: Arc::new(Mutex::new(Vec::new())),
            tracer,
        })
    }

    /// Resolve the trigger, build the function and append it.
    ///
    /// Function ids are unique within a service; a second function with an
    /// id already in the list is rejected and the list is left unchanged.
    pub fn create_function(&self, options: FunctionOptions, handler: FunctionHandler) -> Result<WorkflowFunction, ServiceError> {
        let id = options.id.clone().unwrap_or_default();
        let trigger = options
            .resolve_trigger()
            .ok_or_else(|| ServiceError::MissingTrigger { id: id.clone() })?;
        let function = self.client.create_function(options, trigger, handler)?;

        let mut functions = self.lock()?;
        if functions.iter().any(|existing| existing.id() == function.id()) {
            return Err(ServiceError::DuplicateFunction {
                id: function.id().to_string(),
            });
        }
        functions.push(function.clone());
        debug!(function_id = %function.id(), trigger = %function.trigger().describe(), total = functions.len(), "function created");
        Ok(function)
    }

    /// Send events, injecting trace fields first when tracing is enabled.
    pub async fn send(&self, payload: impl Into<SendPayload>) -> Result<SendEventsResult, ServiceError> {
        self.send_with_parent(payload, None).await
    }

    /// Send events as children of `parent`.
    pub async fn send_with_parent(
        &self,
        payload: impl Into<SendPayload>,
        parent: Option<&TraceContext>,
    ) -> Result<SendEventsResult, ServiceError> {
        let mut payload = payload.into();
        if let Some(tracer) = &self.tracer {
            tracer.inject(&mut payload, parent);
        }
        let count = payload.len();
        match self.client.send(payload).await {
            Ok(result) => {
                debug!(count, ids = result.ids.len(), "events sent");
                Ok(result)
            }
            Err(err) => {
                error!(count, error = %err, "failed to send events");
                Err(err.into())
            }
        }
    }

    /// Snapshot of the registered functions.
    pub fn functions(&self) -> Result<Vec<WorkflowFunction>, ServiceError> {
        Ok(self.lock()?.clone())
    }

    pub fn options(&self) -> &StepwireConfig {
        &self.config
    }

    pub fn client(&self) -> &WorkflowClient {
        &self.client
    }

    pub fn tracer(&self) -> Option<&TraceService> {
        self.tracer.as_ref()
    }

    /// Serve handler over the functions registered so far.
    pub fn serve_handler(&self) -> Result<ServeHandler, ServiceError> {
        let options = ServeOptions {
            signing_key: self.config.signing_key.clone(),
            serve_host: self.config.serve_host.clone(),
            serve_path: self.config.serve_path().to_string(),
        };
        Ok(ServeHandler::new(self.client.clone(), self.functions()?, options))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<WorkflowFunction>>, ServiceError> {
        self.functions.lock().map_err(|error| ServiceError::Lock(error.to_string()))
    }
}

impl FunctionInventory for StepwireService {
    fn app_id(&self) -> &str {
        &self.config.id
    }

    fn function_ids(&self) -> Vec<String> {
        match self.lock() {
            Ok(functions) => functions.iter().map(|function| function.id().to_string()).collect(),
            Err(err) => {
                error!(error = %err, "cannot list functions for health check");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwire_config::{Environment, merge_with_defaults};
    use stepwire_sdk::handler_fn;
    use stepwire_types::Trigger;

    fn service(environment: Environment) -> StepwireService {
        let mut config = StepwireConfig::new("shop", environment);
        if environment == Environment::Production {
            config.event_key = Some("evt".into());
            config.signing_key = Some("sig".into());
            config.base_url = Some("https://api.example.com".parse().unwrap());
        }
        StepwireService::new(Arc::new(merge_with_defaults(config)), None).unwrap()
    }

    fn echo() -> FunctionHandler {
        handler_fn(|ctx| async move { Ok::<_, anyhow::Error>(json!({ "event": ctx.event.name })) })
    }

    #[test]
    fn client_mode_follows_environment() {
        assert_eq!(service(Environment::Development).client().mode(), ClientMode::Dev);
        assert_eq!(service(Environment::Test).client().mode(), ClientMode::Dev);
        assert_eq!(service(Environment::Production).client().mode(), ClientMode::Cloud);
    }

    #[test]
    fn create_function_resolves_triggers_in_order() {
        let service = service(Environment::Development);
        let mut options = FunctionOptions::for_cron("0 * * * *").with_id("legacy");
        options.cron = Some("5 * * * *".into());
        options.event = Some("legacy/event".into());
        options.trigger = None;
        options.triggers = Some(vec![Trigger::event("first/event"), Trigger::event("second/event")]);

        let function = service.create_function(options, echo()).unwrap();
        assert_eq!(function.trigger(), &Trigger::event("first/event"));

        let legacy = FunctionOptions {
            id: Some("cron-only".into()),
            cron: Some("0 0 * * *".into()),
            ..Default::default()
        };
        let function = service.create_function(legacy, echo()).unwrap();
        assert_eq!(function.trigger(), &Trigger::cron("0 0 * * *"));
        assert_eq!(service.function_ids(), vec!["legacy".to_string(), "cron-only".to_string()]);
    }

    #[test]
    fn create_function_without_trigger_is_rejected() {
        let service = service(Environment::Development);
        let err = service
            .create_function(FunctionOptions::default().with_id("orphan"), echo())
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingTrigger { id } if id == "orphan"));
        assert!(service.functions().unwrap().is_empty());
    }

    #[test]
    fn duplicate_function_ids_are_rejected() {
        let service = service(Environment::Development);
        service
            .create_function(FunctionOptions::for_event("order/created").with_id("orders"), echo())
            .unwrap();
        let err = service
            .create_function(FunctionOptions::for_event("order/updated").with_id("orders"), echo())
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateFunction { id } if id == "orders"));
        assert_eq!(service.function_ids(), vec!["orders".to_string()]);
    }

    #[test]
    fn sdk_rejections_propagate() {
        let service = service(Environment::Development);
        let err = service.create_function(FunctionOptions::for_event("a/b"), echo()).unwrap_err();
        assert!(matches!(err, ServiceError::Sdk(_)));
    }

    #[test]
    fn serve_handler_uses_configured_path() {
        let service = service(Environment::Development);
        service
            .create_function(FunctionOptions::for_event("order/created").with_id("orders"), echo())
            .unwrap();
        let handler = service.serve_handler().unwrap();
        assert_eq!(handler.functions().len(), 1);
        assert_eq!(service.options().serve_path(), "/api/stepwire");
    }
}
