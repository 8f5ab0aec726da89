use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use stepwire_config::{Environment, StepwireConfig};
use stepwire_registry::{InstanceContainer, MetadataRegistry, MethodTable};
use stepwire_server::{ModuleHost, ModuleProviders, StepwireHttpServer, StepwireModule, router};
use stepwire_types::{EventPayload, FunctionOptions, HandlerShape};
use tower::ServiceExt;

struct Greeter;

fn host() -> ModuleHost {
    let registry = MetadataRegistry::new();
    registry
        .function::<Greeter>("hello", FunctionOptions::for_event("demo/hello"), HandlerShape::Positional)
        .expect("hello");
    registry
        .function::<Greeter>("fail", FunctionOptions::for_event("demo/fail"), HandlerShape::Context)
        .expect("fail");
    registry.retries::<Greeter>("fail", 2).expect("retries");

    let mut container = InstanceContainer::new();
    container
        .add_provider(
            Arc::new(Greeter),
            MethodTable::builder::<Greeter>()
                .positional_method("hello", |_greeter, event: EventPayload, _step, _ctx| async move {
                    Ok::<_, anyhow::Error>(json!({ "message": format!("hello {}", event.data["name"].as_str().unwrap_or("world")) }))
                })
                .context_method("fail", |_greeter, _input| async move { Err::<Value, anyhow::Error>(anyhow!("always fails")) })
                .build(),
        )
        .expect("greeter");
    ModuleHost::new(Arc::new(container), registry)
}

async fn providers(environment: Environment) -> ModuleProviders {
    let providers = StepwireModule::for_root(host(), StepwireConfig::new("demo", environment)).expect("module");
    let report = providers.init().await;
    assert_eq!(report.registered.len(), 2);
    providers
}

async fn app(environment: Environment) -> Router {
    router(&providers(environment).await).expect("router")
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn invoke(fn_id: &str, event: Value) -> Request<Body> {
    let body = json!({ "event": event, "ctx": { "runId": "run-1", "attempt": 0 } });
    Request::builder()
        .method("POST")
        .uri(format!("/api/stepwire?fnId={fn_id}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn get_returns_introspection() {
    let request = Request::builder()
        .uri("/api/stepwire")
        .header("host", "localhost:3000")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app(Environment::Development).await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["functionCount"], 2);
    assert_eq!(body["mode"], "dev");
    assert_eq!(body["functions"][0]["id"], "demo-Greeter.hello");
}

#[tokio::test]
async fn post_invokes_the_bound_method() {
    let request = invoke("Greeter.hello", json!({ "name": "demo/hello", "data": { "name": "Ada" } }));
    let (status, body) = call(app(Environment::Development).await, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "message": "hello Ada" }));
}

#[tokio::test]
async fn handler_failure_is_a_retriable_500_and_is_recorded() {
    let providers = providers(Environment::Development).await;
    let app = router(&providers).unwrap();
    let request = invoke("demo-Greeter.fail", json!({ "name": "demo/fail", "data": {} }));
    let (status, body) = call(app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "always fails");
    assert_eq!(body["retriable"], true);

    let metrics = providers.monitoring.as_ref().unwrap().function_metrics("Greeter.fail").unwrap().unwrap();
    assert_eq!(metrics.failed_executions, 1);
}

#[tokio::test]
async fn unknown_function_becomes_500_with_message() {
    let request = invoke("missing", json!({ "name": "demo/hello" }));
    let (status, body) = call(app(Environment::Development).await, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Function not found: missing");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/stepwire?fnId=Greeter.hello")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(app(Environment::Development).await, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));
}

#[tokio::test]
async fn health_and_metrics_routes_follow_config() {
    let providers = providers(Environment::Development).await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(router(&providers).unwrap(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, body) = call(router(&providers).unwrap(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("stepwire_function_executions_total"));

    // Monitoring is off in test environments, so there is no metrics route.
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, _) = call(app(Environment::Test).await, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn server_starts_and_stops() {
    let providers = providers(Environment::Development).await;
    let server = StepwireHttpServer::new("127.0.0.1:0".parse().unwrap(), providers)
        .start()
        .await
        .unwrap();
    assert_ne!(server.bound_address().port(), 0);
    server.stop().await.unwrap();
}
