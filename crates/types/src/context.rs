//! Execution context, step tools and SDK middleware contracts.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::event::{EventPayload, SendEventsResult, SendPayload};

/// Context keys owned by the SDK. Middleware may not write these as extensions.
pub const STANDARD_CONTEXT_KEYS: &[&str] = &["event", "events", "step", "runId", "attempt", "logger"];

/// Whether a handler takes one aggregate input or positional arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerShape {
    /// `handler(FunctionInput { event, step, ctx })`
    Context,
    /// `handler(event, step, ctx)`
    Positional,
}

impl fmt::Display for HandlerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerShape::Context => write!(f, "context"),
            HandlerShape::Positional => write!(f, "positional"),
        }
    }
}

/// Options for `wait_for_event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForEventOptions {
    pub event: String,
    pub timeout: String,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Step orchestration tools handed to a handler at invocation time.
///
/// Implementations belong to the workflow SDK; handlers only call them.
#[async_trait]
pub trait StepTools: Send + Sync {
    /// Run `work` as a retriable, memoized step identified by `id`.
    async fn run(&self, id: &str, work: BoxFuture<'static, anyhow::Result<Value>>) -> anyhow::Result<Value>;

    /// Pause the run for `duration`.
    ///
    /// Implementations may end the current invocation with an error that
    /// the handler should propagate with `?`; the run resumes after the delay.
    async fn sleep(&self, id: &str, duration: Duration) -> anyhow::Result<()>;

    /// Pause the run until `until`.
    async fn sleep_until(&self, id: &str, until: DateTime<Utc>) -> anyhow::Result<()>;

    /// Wait for a matching event, returning `None` on timeout.
    async fn wait_for_event(&self, id: &str, options: WaitForEventOptions) -> anyhow::Result<Option<EventPayload>>;

    /// Send events from inside a run.
    async fn send_event(&self, id: &str, payload: SendPayload) -> anyhow::Result<SendEventsResult>;
}

impl dyn StepTools {
    /// Typed wrapper around [`StepTools::run`] that serializes the step output.
    pub async fn run_as<T, Fut>(&self, id: &str, work: Fut) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let value = self
            .run(
                id,
                Box::pin(async move {
                    let output = work.await?;
                    Ok(serde_json::to_value(output)?)
                }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Shared handle to the step tools of one invocation.
pub type StepHandle = Arc<dyn StepTools>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("context key '{key}' is reserved by the SDK")]
    ReservedKey { key: String },
}

/// Everything the SDK knows about one invocation.
///
/// Middleware-contributed fields live in `extensions`, never alongside the
/// standard keys.
#[derive(Clone)]
pub struct ExecutionContext {
    pub event: EventPayload,
    pub events: Vec<EventPayload>,
    pub step: StepHandle,
    pub run_id: String,
    pub attempt: u32,
    extensions: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(event: EventPayload, events: Vec<EventPayload>, step: StepHandle, run_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            event,
            events,
            step,
            run_id: run_id.into(),
            attempt,
            extensions: Map::new(),
        }
    }

    /// Add a middleware-contributed field.
    pub fn set_extension(&mut self, key: impl Into<String>, value: Value) -> Result<(), ContextError> {
        let key = key.into();
        if STANDARD_CONTEXT_KEYS.contains(&key.as_str()) {
            return Err(ContextError::ReservedKey { key });
        }
        self.extensions.insert(key, value);
        Ok(())
    }

    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    pub fn extensions(&self) -> &Map<String, Value> {
        &self.extensions
    }

    /// Build the user-facing context passed alongside `event` and `step`.
    pub fn handler_context(&self) -> HandlerContext {
        HandlerContext {
            run_id: self.run_id.clone(),
            attempt: self.attempt,
            events: self.events.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("event", &self.event.name)
            .field("events", &self.events.len())
            .field("run_id", &self.run_id)
            .field("attempt", &self.attempt)
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The `ctx` argument seen by user handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerContext {
    pub run_id: String,
    pub attempt: u32,
    pub events: Vec<EventPayload>,
    /// Fields contributed by middleware for this invocation.
    pub extensions: Map<String, Value>,
}

impl HandlerContext {
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }
}

/// Aggregate input for handlers registered with [`HandlerShape::Context`].
#[derive(Clone)]
pub struct FunctionInput {
    pub event: EventPayload,
    pub step: StepHandle,
    pub ctx: HandlerContext,
}

/// SDK middleware that transforms the execution context before a handler runs.
#[async_trait]
pub trait FunctionMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn transform_input(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()>;
}

/// Cloneable, debuggable handle to a middleware.
#[derive(Clone)]
pub struct MiddlewareHandle(Arc<dyn FunctionMiddleware>);

impl MiddlewareHandle {
    pub fn new<M: FunctionMiddleware + 'static>(middleware: M) -> Self {
        Self(Arc::new(middleware))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub async fn transform_input(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        self.0.transform_input(ctx).await
    }
}

impl From<Arc<dyn FunctionMiddleware>> for MiddlewareHandle {
    fn from(inner: Arc<dyn FunctionMiddleware>) -> Self {
        Self(inner)
    }
}

impl fmt::Debug for MiddlewareHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MiddlewareHandle").field(&self.name()).finish()
    }
}
