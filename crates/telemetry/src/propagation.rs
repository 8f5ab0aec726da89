//! W3C-style `traceparent` handling for event payloads.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use stepwire_types::{EventPayload, SendPayload};
use tracing::debug;
use uuid::Uuid;

use crate::error::TelemetryError;

/// Event data field carrying the formatted header.
pub const TRACEPARENT_FIELD: &str = "traceparent";

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{2}$").expect("valid version regex"));
static TRACE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{32}$").expect("valid trace id regex"));
static SPAN_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{16}$").expect("valid span id regex"));
static FLAGS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{2}$").expect("valid flags regex"));

/// Parsed `version-traceid-spanid-flags` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    pub version: String,
    pub trace_id: String,
    pub span_id: String,
    pub flags: String,
}

impl TraceContext {
    pub fn is_sampled(&self) -> bool {
        u8::from_str_radix(&self.flags, 16).is_ok_and(|flags| flags & 0x01 == 0x01)
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", self.version, self.trace_id, self.span_id, self.flags)
    }
}

/// Creates, parses and propagates trace contexts.
#[derive(Debug, Clone)]
pub struct TraceService {
    service_name: String,
}

impl TraceService {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn parse(&self, header: &str) -> Result<TraceContext, TelemetryError> {
        let parts: Vec<&str> = header.trim().split('-').collect();
        let [version, trace_id, span_id, flags] = parts.as_slice() else {
            return Err(TelemetryError::invalid_traceparent(header, format!("expected 4 parts, found {}", parts.len())));
        };
        if !VERSION_RE.is_match(version) {
            return Err(TelemetryError::invalid_traceparent(header, "version must be 2 lowercase hex digits"));
        }
        if !TRACE_ID_RE.is_match(trace_id) || trace_id.bytes().all(|b| b == b'0') {
            return Err(TelemetryError::invalid_traceparent(header, "trace id must be 32 hex digits and not all zero"));
        }
        if !SPAN_ID_RE.is_match(span_id) || span_id.bytes().all(|b| b == b'0') {
            return Err(TelemetryError::invalid_traceparent(header, "span id must be 16 hex digits and not all zero"));
        }
        if !FLAGS_RE.is_match(flags) {
            return Err(TelemetryError::invalid_traceparent(header, "flags must be 2 lowercase hex digits"));
        }
        Ok(TraceContext {
            version: version.to_string(),
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            flags: flags.to_string(),
        })
    }

    pub fn format(&self, context: &TraceContext) -> String {
        context.to_string()
    }

    /// New sampled context with fresh trace and span ids.
    pub fn create_root(&self) -> TraceContext {
        TraceContext {
            version: "00".to_string(),
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            flags: "01".to_string(),
        }
    }

    /// Same trace, new span.
    pub fn create_child(&self, parent: &TraceContext) -> TraceContext {
        TraceContext {
            span_id: new_span_id(),
            ..parent.clone()
        }
    }

    /// Merge trace fields into every event's data. Each event gets its own
    /// child span of `parent`, or of a fresh root when there is no parent.
    pub fn inject(&self, payload: &mut SendPayload, parent: Option<&TraceContext>) {
        let parent = parent.cloned().unwrap_or_else(|| self.create_root());
        for event in payload.events_mut() {
            let child = self.create_child(&parent);
            event.merge_data(&trace_fields(&child));
            debug!(service = %self.service_name, event = %event.name, trace_id = %child.trace_id, "trace context injected");
        }
    }

    /// Trace context carried in an event's data, if present and well formed.
    pub fn extract(&self, event: &EventPayload) -> Option<TraceContext> {
        let header = event.data.get(TRACEPARENT_FIELD)?.as_str()?;
        match self.parse(header) {
            Ok(context) => Some(context),
            Err(error) => {
                debug!(error = %error, event = %event.name, "ignoring malformed traceparent");
                None
            }
        }
    }
}

fn new_span_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

fn trace_fields(context: &TraceContext) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(TRACEPARENT_FIELD.to_string(), Value::String(context.to_string()));
    fields.insert("traceId".to_string(), Value::String(context.trace_id.clone()));
    fields.insert("spanId".to_string(), Value::String(context.span_id.clone()));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HEADER: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn service() -> TraceService {
        TraceService::new("shop")
    }

    #[test]
    fn parses_and_formats_a_valid_header() {
        let context = service().parse(HEADER).unwrap();
        assert_eq!(context.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(context.span_id, "00f067aa0ba902b7");
        assert!(context.is_sampled());
        assert_eq!(service().format(&context), HEADER);
    }

    #[test]
    fn rejects_malformed_headers() {
        let service = service();
        for header in [
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra",
            "0-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-zz",
        ] {
            assert!(
                matches!(service.parse(header), Err(TelemetryError::InvalidTraceParent { .. })),
                "{header} should be rejected"
            );
        }
    }

    #[test]
    fn children_share_the_trace_but_not_the_span() {
        let service = service();
        let root = service.create_root();
        let child = service.create_child(&root);
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
        assert!(service.parse(&child.to_string()).is_ok());
    }

    #[test]
    fn inject_gives_each_event_its_own_span() {
        let service = service();
        let parent = service.parse(HEADER).unwrap();
        let mut payload = SendPayload::from(vec![
            EventPayload::new("order/created", json!({ "orderId": 1 })),
            EventPayload::new("order/created", json!({ "orderId": 2 })),
        ]);
        service.inject(&mut payload, Some(&parent));

        let events = payload.into_events();
        let first = service.extract(&events[0]).unwrap();
        let second = service.extract(&events[1]).unwrap();
        assert_eq!(first.trace_id, parent.trace_id);
        assert_eq!(second.trace_id, parent.trace_id);
        assert_ne!(first.span_id, second.span_id);
        assert_eq!(events[0].data["orderId"], 1);
        assert_eq!(events[0].data["traceId"], parent.trace_id.as_str());
        assert_eq!(events[0].data["spanId"], first.span_id.as_str());
    }

    #[test]
    fn extract_ignores_missing_or_malformed_fields() {
        let service = service();
        assert!(service.extract(&EventPayload::new("e", json!({}))).is_none());
        assert!(service.extract(&EventPayload::new("e", json!({ "traceparent": "nope" }))).is_none());
    }
}
