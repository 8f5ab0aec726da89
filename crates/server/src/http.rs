//! HTTP surface for a built module.

use std::{collections::HashMap, net::SocketAddr};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use stepwire_sdk::{ServeHandler, ServeMethod, ServeRequest};
use stepwire_telemetry::{BackgroundTask, HealthService, HealthState, MonitoringService};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{error::ModuleError, module::ModuleProviders};

#[derive(Clone)]
struct AppState {
    handler: ServeHandler,
    health: Option<HealthService>,
    monitoring: Option<MonitoringService>,
}

/// Router serving the executor endpoint plus the enabled telemetry routes.
///
/// Functions registered after the router is built are not served, so run
/// [`ModuleProviders::init`] first.
pub fn router(providers: &ModuleProviders) -> Result<Router, ModuleError> {
    let config = &providers.config;
    let state = AppState {
        handler: providers.service.serve_handler()?,
        health: providers.health.clone(),
        monitoring: providers.monitoring.clone(),
    };

    let mut router = Router::new().route(config.serve_path(), get(serve).post(serve).put(serve));
    if state.health.is_some() {
        router = router.route(config.health_path(), get(health));
    }
    if state.monitoring.is_some() {
        router = router.route(config.metrics_path(), get(metrics));
    }
    Ok(router.with_state(state))
}

async fn serve(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let method = match method {
        Method::GET => ServeMethod::Get,
        Method::POST => ServeMethod::Post,
        Method::PUT => ServeMethod::Put,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    let body = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(body) => Some(body),
            Err(err) => {
                warn!(error = %err, "rejecting request with malformed JSON body");
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("invalid JSON body: {err}") }))).into_response();
            }
        }
    };

    let mut request = ServeRequest::new(method);
    if let Some(body) = body {
        request = request.with_body(body);
    }
    for (key, value) in query {
        request = request.with_query(key, value);
    }
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    match state.handler.handle(request).await {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(response.body)).into_response()
        }
        Err(err) => {
            error!(error = %err, "serve handler failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let Some(health) = state.health else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let report = health.check().await;
    let status = match report.status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthState::Healthy | HealthState::Degraded => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}

async fn metrics(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let Some(monitoring) = state.monitoring else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let export = if query.get("format").is_some_and(|format| format == "json") {
        monitoring.export_json().map(|body| Json(body).into_response())
    } else {
        monitoring
            .export_text()
            .map(|text| ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response())
    };
    export.unwrap_or_else(|err| {
        error!(error = %err, "metrics export failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() }))).into_response()
    })
}

/// Host for a module's HTTP surface.
pub struct StepwireHttpServer {
    bind_address: SocketAddr,
    providers: ModuleProviders,
}

impl StepwireHttpServer {
    pub fn new(bind_address: SocketAddr, providers: ModuleProviders) -> Self {
        Self { bind_address, providers }
    }

    /// Bind, start the background timers and serve until stopped.
    pub async fn start(self) -> Result<RunningStepwireServer, ModuleError> {
        let router = router(&self.providers)?;
        let listener = tokio::net::TcpListener::bind(self.bind_address).await?;
        let bound_address = listener.local_addr()?;
        let background = self.providers.start_background_tasks();

        let cancellation_token = CancellationToken::new();
        let server_handle = tokio::spawn({
            let shutdown = cancellation_token.child_token();
            async move {
                if let Err(err) = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await
                {
                    error!(error = %err, "HTTP server stopped with an error");
                }
            }
        });

        info!(
            address = %bound_address,
            path = self.providers.config.serve_path(),
            "stepwire endpoint listening"
        );
        Ok(RunningStepwireServer {
            bind_address: bound_address,
            cancellation_token,
            server_handle,
            background,
        })
    }
}

/// Runtime handle for a started server.
#[derive(Debug)]
pub struct RunningStepwireServer {
    bind_address: SocketAddr,
    cancellation_token: CancellationToken,
    server_handle: JoinHandle<()>,
    background: Vec<BackgroundTask>,
}

impl RunningStepwireServer {
    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Stop serving and wait for the server and timers to finish.
    pub async fn stop(self) -> Result<(), ModuleError> {
        self.cancellation_token.cancel();
        for task in self.background {
            task.stop().await;
        }
        self.server_handle
            .await
            .map_err(|error| ModuleError::Task(error.to_string()))?;
        info!(address = %self.bind_address, "stepwire endpoint stopped");
        Ok(())
    }
}
