//! Event payloads sent to and received from the workflow executor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single event.
///
/// Outgoing events usually only carry `name` and `data`; events received by a
/// handler also carry the executor-assigned `id` and `ts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub name: String,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Event timestamp in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl EventPayload {
    /// Create an event with the given name and data.
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            id: None,
            ts: None,
            user: None,
            v: None,
        }
    }

    /// Shallow-merge `fields` into the event's `data` object.
    ///
    /// Non-object data is replaced by an object holding the original value
    /// under `"value"` so that merged fields are never silently dropped.
    pub fn merge_data(&mut self, fields: &Map<String, Value>) {
        if !self.data.is_object() {
            let original = std::mem::take(&mut self.data);
            let mut wrapped = Map::new();
            if !original.is_null() {
                wrapped.insert("value".to_string(), original);
            }
            self.data = Value::Object(wrapped);
        }
        if let Value::Object(data) = &mut self.data {
            for (key, value) in fields {
                data.insert(key.clone(), value.clone());
            }
        }
    }
}

/// One event or a batch of events, as accepted by `send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendPayload {
    One(EventPayload),
    Many(Vec<EventPayload>),
}

impl SendPayload {
    /// Number of events in the payload.
    pub fn len(&self) -> usize {
        match self {
            SendPayload::One(_) => 1,
            SendPayload::Many(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutable iterator over every event in the payload.
    pub fn events_mut(&mut self) -> Box<dyn Iterator<Item = &mut EventPayload> + '_> {
        match self {
            SendPayload::One(event) => Box::new(std::iter::once(event)),
            SendPayload::Many(events) => Box::new(events.iter_mut()),
        }
    }

    /// Consume the payload into a list of events.
    pub fn into_events(self) -> Vec<EventPayload> {
        match self {
            SendPayload::One(event) => vec![event],
            SendPayload::Many(events) => events,
        }
    }
}

impl From<EventPayload> for SendPayload {
    fn from(event: EventPayload) -> Self {
        SendPayload::One(event)
    }
}

impl From<Vec<EventPayload>> for SendPayload {
    fn from(events: Vec<EventPayload>) -> Self {
        SendPayload::Many(events)
    }
}

/// Result of a successful send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEventsResult {
    pub ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_data_is_shallow() {
        let mut event = EventPayload::new("app/signup", json!({"user": {"id": 1}, "plan": "free"}));
        let mut fields = Map::new();
        fields.insert("plan".into(), json!("pro"));
        fields.insert("traceId".into(), json!("abc"));
        event.merge_data(&fields);

        assert_eq!(event.data, json!({"user": {"id": 1}, "plan": "pro", "traceId": "abc"}));
    }

    #[test]
    fn merge_data_wraps_non_object_data() {
        let mut event = EventPayload::new("app/ping", json!(42));
        let mut fields = Map::new();
        fields.insert("traceId".into(), json!("abc"));
        event.merge_data(&fields);

        assert_eq!(event.data, json!({"value": 42, "traceId": "abc"}));
    }

    #[test]
    fn send_payload_deserializes_single_and_batch() {
        let single: SendPayload = serde_json::from_value(json!({"name": "a"})).expect("single");
        assert_eq!(single.len(), 1);

        let batch: SendPayload = serde_json::from_value(json!([{"name": "a"}, {"name": "b", "data": {"x": 1}}])).expect("batch");
        assert_eq!(batch.len(), 2);
        let names: Vec<_> = batch.into_events().into_iter().map(|event| event.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn missing_data_defaults_to_empty_object() {
        let event: EventPayload = serde_json::from_value(json!({"name": "a"})).expect("event");
        assert_eq!(event.data, json!({}));
    }
}
