//! Workflow function objects.

use std::{fmt, sync::Arc};

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value, json};
use stepwire_types::{
    BatchEventsPolicy, CancelOn, ConcurrencyPolicy, DebouncePolicy, ExecutionContext, FunctionOptions, MiddlewareHandle, PriorityPolicy,
    RateLimitPolicy, ThrottlePolicy, Timeouts, Trigger,
};
use url::Url;

use crate::error::SdkError;

/// Retry attempts used when a function does not configure `retries`.
pub const DEFAULT_RETRIES: u32 = 3;
/// Upper bound accepted for `retries`.
pub const MAX_RETRIES: u32 = 20;

/// Type-erased async handler invoked with the SDK execution context.
pub type FunctionHandler = Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`FunctionHandler`].
pub fn handler_fn<F, Fut>(handler: F) -> FunctionHandler
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(handler(ctx)))
}

/// A validated function ready to be served.
#[derive(Clone)]
pub struct WorkflowFunction {
    id: String,
    options: FunctionOptions,
    trigger: Trigger,
    middleware: Vec<MiddlewareHandle>,
    handler: FunctionHandler,
}

impl WorkflowFunction {
    pub(crate) fn build(
        options: FunctionOptions,
        trigger: Trigger,
        handler: FunctionHandler,
        client_middleware: &[MiddlewareHandle],
    ) -> Result<Self, SdkError> {
        let id = options
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SdkError::invalid_function("<unnamed>", "function id is required"))?;

        validate_trigger(&id, &trigger)?;
        validate_policies(&id, &options)?;

        let mut middleware = client_middleware.to_vec();
        if let Some(function_middleware) = &options.middleware {
            middleware.extend(function_middleware.iter().cloned());
        }

        Ok(Self {
            id,
            options,
            trigger,
            middleware,
            handler,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, falling back to the id.
    pub fn name(&self) -> &str {
        self.options.name.as_deref().unwrap_or(&self.id)
    }

    pub fn options(&self) -> &FunctionOptions {
        &self.options
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Middleware applied on every invocation, client-level first.
    pub fn middleware(&self) -> &[MiddlewareHandle] {
        &self.middleware
    }

    /// Retry attempts the executor should use.
    pub fn retries(&self) -> u32 {
        self.options.retries.unwrap_or(DEFAULT_RETRIES)
    }

    /// Fully-qualified id used by the executor: `{app_id}-{id}`.
    pub fn slug(&self, app_id: &str) -> String {
        format!("{app_id}-{}", self.id)
    }

    /// Registration manifest for this function.
    pub fn manifest(&self, app_id: &str, serve_url: &Url) -> FunctionManifest {
        let slug = self.slug(app_id);
        let mut step_url = serve_url.clone();
        step_url.query_pairs_mut().append_pair("fnId", &slug).append_pair("stepId", "step");

        let mut steps = Map::new();
        steps.insert(
            "step".to_string(),
            json!({
                "id": "step",
                "name": "step",
                "runtime": { "type": "http", "url": step_url.as_str() },
                "retries": { "attempts": self.retries() },
            }),
        );

        FunctionManifest {
            id: slug,
            name: self.name().to_string(),
            triggers: vec![self.trigger.clone()],
            steps,
            concurrency: self.options.concurrency.clone(),
            rate_limit: self.options.rate_limit.clone(),
            throttle: self.options.throttle.clone(),
            debounce: self.options.debounce.clone(),
            batch_events: self.options.batch_events.clone(),
            cancel: self.options.cancel_on.clone(),
            timeouts: self.options.timeouts.clone(),
            priority: self.options.priority.clone(),
            idempotency: self.options.idempotency.clone(),
        }
    }

    /// Run middleware over the context, then the handler.
    pub async fn invoke(&self, mut ctx: ExecutionContext) -> anyhow::Result<Value> {
        for middleware in &self.middleware {
            middleware.transform_input(&mut ctx).await?;
        }
        (self.handler)(ctx).await
    }
}

impl fmt::Debug for WorkflowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowFunction")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("middleware", &self.middleware)
            .finish()
    }
}

/// Function description sent to the executor during sync and returned by introspection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionManifest {
    pub id: String,
    pub name: String,
    pub triggers: Vec<Trigger>,
    pub steps: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<ConcurrencyPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottlePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce: Option<DebouncePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_events: Option<BatchEventsPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel: Option<Vec<CancelOn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<Timeouts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency: Option<String>,
}

fn validate_trigger(id: &str, trigger: &Trigger) -> Result<(), SdkError> {
    match trigger {
        Trigger::Event { event, .. } => {
            if event.trim().is_empty() {
                return Err(SdkError::invalid_trigger(id, "event name cannot be empty"));
            }
            if event.chars().any(char::is_whitespace) {
                return Err(SdkError::invalid_trigger(id, format!("event name '{event}' cannot contain whitespace")));
            }
        }
        Trigger::Cron { cron } => {
            let fields = cron.split_whitespace().count();
            if !(5..=6).contains(&fields) {
                return Err(SdkError::invalid_trigger(
                    id,
                    format!("cron expression '{cron}' must have 5 or 6 fields, found {fields}"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_policies(id: &str, options: &FunctionOptions) -> Result<(), SdkError> {
    if let Some(retries) = options.retries
        && retries > MAX_RETRIES
    {
        return Err(SdkError::invalid_function(id, format!("retries must be at most {MAX_RETRIES}, got {retries}")));
    }
    if let Some(concurrency) = &options.concurrency
        && concurrency.limit == 0
    {
        return Err(SdkError::invalid_function(id, "concurrency limit must be greater than zero"));
    }
    if let Some(rate_limit) = &options.rate_limit {
        require_limit_and_period(id, "rateLimit", rate_limit.limit, &rate_limit.period)?;
    }
    if let Some(throttle) = &options.throttle {
        require_limit_and_period(id, "throttle", throttle.limit, &throttle.period)?;
    }
    if let Some(debounce) = &options.debounce
        && debounce.period.trim().is_empty()
    {
        return Err(SdkError::invalid_function(id, "debounce period cannot be empty"));
    }
    Ok(())
}

fn require_limit_and_period(id: &str, field: &str, limit: u32, period: &str) -> Result<(), SdkError> {
    if limit == 0 {
        return Err(SdkError::invalid_function(id, format!("{field} limit must be greater than zero")));
    }
    if period.trim().is_empty() {
        return Err(SdkError::invalid_function(id, format!("{field} period cannot be empty")));
    }
    Ok(())
}
