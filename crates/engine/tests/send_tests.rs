use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};
use stepwire_config::{Environment, StepwireConfig, merge_with_defaults};
use stepwire_engine::{ServiceError, StepwireService};
use stepwire_telemetry::{TRACEPARENT_FIELD, TraceService};
use stepwire_types::EventPayload;

type Captured = Arc<Mutex<Vec<Value>>>;

async fn receive(State(captured): State<Captured>, Json(events): Json<Vec<Value>>) -> Json<Value> {
    let mut captured = captured.lock().expect("captured events");
    let ids: Vec<String> = (captured.len()..captured.len() + events.len()).map(|index| format!("evt-{index}")).collect();
    captured.extend(events);
    Json(json!({ "ids": ids }))
}

/// Local event API that records every posted event.
async fn event_api() -> (SocketAddr, Captured) {
    let captured = Captured::default();
    let app = Router::new().route("/e/{key}", post(receive)).with_state(Arc::clone(&captured));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (address, captured)
}

fn service(address: SocketAddr, tracer: Option<TraceService>) -> StepwireService {
    let mut config = StepwireConfig::new("shop", Environment::Development);
    config.base_url = Some(format!("http://{address}/").parse().expect("base url"));
    StepwireService::new(Arc::new(merge_with_defaults(config)), tracer).expect("service")
}

#[tokio::test]
async fn send_injects_trace_fields_before_forwarding() {
    let (address, captured) = event_api().await;
    let tracer = TraceService::new("shop");
    let service = service(address, Some(tracer.clone()));

    let result = service
        .send(vec![
            EventPayload::new("order/created", json!({ "orderId": 1 })),
            EventPayload::new("order/created", json!({ "orderId": 2 })),
        ])
        .await
        .unwrap();
    assert_eq!(result.ids, vec!["evt-0", "evt-1"]);

    let events = captured.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    for (index, event) in events.iter().enumerate() {
        let data = &event["data"];
        assert_eq!(data["orderId"], index as u64 + 1);
        let context = tracer.parse(data[TRACEPARENT_FIELD].as_str().unwrap()).unwrap();
        assert_eq!(data["traceId"], context.trace_id);
        assert_eq!(data["spanId"], context.span_id);
    }
    assert_eq!(events[0]["data"]["traceId"], events[1]["data"]["traceId"]);
    assert_ne!(events[0]["data"]["spanId"], events[1]["data"]["spanId"]);
}

#[tokio::test]
async fn send_with_parent_continues_the_parent_trace() {
    let (address, captured) = event_api().await;
    let tracer = TraceService::new("shop");
    let service = service(address, Some(tracer.clone()));
    let parent = tracer.parse("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").unwrap();

    service
        .send_with_parent(EventPayload::new("invoice/issued", json!({})), Some(&parent))
        .await
        .unwrap();

    let events = captured.lock().unwrap().clone();
    assert_eq!(events[0]["data"]["traceId"], "4bf92f3577b34da6a3ce929d0e0e4736");
    assert_ne!(events[0]["data"]["spanId"], "00f067aa0ba902b7");
}

#[tokio::test]
async fn send_without_tracer_leaves_data_untouched() {
    let (address, captured) = event_api().await;
    let service = service(address, None);

    service.send(EventPayload::new("order/created", json!({ "orderId": 3 }))).await.unwrap();

    let events = captured.lock().unwrap().clone();
    assert_eq!(events[0]["data"], json!({ "orderId": 3 }));
}

#[tokio::test]
async fn send_failures_are_raised_to_the_caller() {
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let service = service(closed, Some(TraceService::new("shop")));

    let err = service
        .send(EventPayload::new("order/created", json!({ "orderId": 4 })))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Sdk(_)), "unexpected error: {err:?}");
}
