//! Serve handler answering the executor's HTTP calls.
//!
//! The handler is framework-agnostic: the HTTP layer converts its request into
//! a [`ServeRequest`] and writes the [`ServeResponse`] back. Three methods are
//! understood:
//!
//! - `GET` returns an introspection document
//! - `PUT` syncs every function manifest with the executor
//! - `POST ?fnId=...` invokes one function with memoized step state

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use stepwire_types::{EventPayload, ExecutionContext};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    SDK_NAME, SDK_VERSION,
    client::{ClientMode, RegistrationRequest, WorkflowClient},
    error::SdkError,
    function::WorkflowFunction,
    step::{InlineStep, StepInterrupt},
};

/// Framework name reported during registration.
const FRAMEWORK: &str = "stepwire";

/// HTTP methods understood by the serve handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMethod {
    Get,
    Post,
    Put,
}

/// Request as seen by the serve handler.
#[derive(Debug, Clone)]
pub struct ServeRequest {
    pub method: ServeMethod,
    pub query: HashMap<String, String>,
    /// Header names are expected in lowercase.
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl ServeRequest {
    pub fn new(method: ServeMethod) -> Self {
        Self {
            method,
            query: HashMap::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Response produced by the serve handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ServeResponse {
    pub status: u16,
    pub body: Value,
}

impl ServeResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

/// Serve-time settings.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub signing_key: Option<String>,
    /// Public origin of this service, used to build step URLs during sync.
    pub serve_host: Option<Url>,
    pub serve_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvocationContext {
    #[serde(default)]
    run_id: String,
    #[serde(default)]
    attempt: u32,
}

#[derive(Debug, Deserialize)]
struct InvocationBody {
    event: EventPayload,
    #[serde(default)]
    events: Vec<EventPayload>,
    #[serde(default)]
    steps: Map<String, Value>,
    #[serde(default)]
    ctx: InvocationContext,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Introspection {
    function_count: usize,
    has_event_key: bool,
    has_signing_key: bool,
    mode: ClientMode,
    sdk: String,
}

/// Handles executor calls for a fixed set of functions.
#[derive(Debug, Clone)]
pub struct ServeHandler {
    client: WorkflowClient,
    functions: Arc<Vec<WorkflowFunction>>,
    options: ServeOptions,
}

impl ServeHandler {
    pub fn new(client: WorkflowClient, functions: Vec<WorkflowFunction>, options: ServeOptions) -> Self {
        Self {
            client,
            functions: Arc::new(functions),
            options,
        }
    }

    pub fn functions(&self) -> &[WorkflowFunction] {
        &self.functions
    }

    pub async fn handle(&self, request: ServeRequest) -> Result<ServeResponse, SdkError> {
        match request.method {
            ServeMethod::Get => self.introspect(&request),
            ServeMethod::Put => self.register(&request).await,
            ServeMethod::Post => self.invoke(request).await,
        }
    }

    fn introspect(&self, request: &ServeRequest) -> Result<ServeResponse, SdkError> {
        let info = Introspection {
            function_count: self.functions.len(),
            has_event_key: self.client.options().event_key.is_some(),
            has_signing_key: self.options.signing_key.is_some(),
            mode: self.client.mode(),
            sdk: format!("{SDK_NAME}:v{SDK_VERSION}"),
        };
        let mut body = serde_json::to_value(info)?;
        // Manifests need a serve URL; omit them when none can be resolved.
        if let Ok(serve_url) = self.serve_url(request) {
            let manifests = self
                .functions
                .iter()
                .map(|function| function.manifest(self.client.id(), &serve_url))
                .collect::<Vec<_>>();
            body["functions"] = serde_json::to_value(manifests)?;
        }
        Ok(ServeResponse::ok(body))
    }

    async fn register(&self, request: &ServeRequest) -> Result<ServeResponse, SdkError> {
        let serve_url = self.serve_url(request)?;
        let registration = RegistrationRequest {
            url: serve_url.to_string(),
            app_name: self.client.id().to_string(),
            framework: FRAMEWORK.to_string(),
            sdk: format!("{SDK_NAME}:v{SDK_VERSION}"),
            deploy_type: "ping".to_string(),
            functions: self
                .functions
                .iter()
                .map(|function| function.manifest(self.client.id(), &serve_url))
                .collect(),
        };
        self.client.sync(&registration).await?;
        info!(url = %serve_url, function_count = self.functions.len(), "registration synced");
        Ok(ServeResponse::ok(json!({ "message": "Successfully registered", "modified": true })))
    }

    async fn invoke(&self, request: ServeRequest) -> Result<ServeResponse, SdkError> {
        let fn_id = request
            .query
            .get("fnId")
            .ok_or_else(|| SdkError::bad_request("missing 'fnId' query parameter"))?;
        let function = self.find(fn_id)?;

        let body = request.body.ok_or_else(|| SdkError::bad_request("missing invocation body"))?;
        let body: InvocationBody =
            serde_json::from_value(body).map_err(|err| SdkError::bad_request(format!("malformed invocation body: {err}")))?;

        let events = if body.events.is_empty() {
            vec![body.event.clone()]
        } else {
            body.events
        };
        let step = Arc::new(InlineStep::new(body.steps, Some(self.client.clone())));
        let ctx = ExecutionContext::new(body.event, events, step.clone(), body.ctx.run_id, body.ctx.attempt);

        debug!(function_id = %function.id(), run_id = %ctx.run_id, attempt = ctx.attempt, "invoking function");
        match function.invoke(ctx).await {
            Ok(data) => Ok(ServeResponse::ok(json!({ "data": data, "steps": step.ops() }))),
            Err(err) if StepInterrupt::is_interrupt(&err) => {
                debug!(function_id = %function.id(), reason = %err, "invocation suspended");
                Ok(ServeResponse {
                    status: 206,
                    body: json!({ "steps": step.ops() }),
                })
            }
            Err(err) => {
                let retriable = body.ctx.attempt < function.retries();
                warn!(function_id = %function.id(), error = %err, retriable, "function invocation failed");
                Ok(ServeResponse {
                    status: 500,
                    body: json!({ "error": err.to_string(), "retriable": retriable, "steps": step.ops() }),
                })
            }
        }
    }

    fn find(&self, fn_id: &str) -> Result<&WorkflowFunction, SdkError> {
        let app_id = self.client.id();
        self.functions
            .iter()
            .find(|function| function.id() == fn_id || function.slug(app_id) == fn_id)
            .ok_or_else(|| SdkError::function_not_found(fn_id))
    }

    fn serve_url(&self, request: &ServeRequest) -> Result<Url, SdkError> {
        let origin = match &self.options.serve_host {
            Some(host) => host.clone(),
            None => {
                let host = request.headers.get("host").ok_or(SdkError::MissingServeHost)?;
                let scheme = request
                    .headers
                    .get("x-forwarded-proto")
                    .map(String::as_str)
                    .unwrap_or("http");
                Url::parse(&format!("{scheme}://{host}"))?
            }
        };
        let path = if self.options.serve_path.is_empty() {
            "/"
        } else {
            self.options.serve_path.as_str()
        };
        Ok(origin.join(path)?)
    }
}
