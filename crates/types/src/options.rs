//! Function options and flow-control policies.
//!
//! `FunctionOptions` is the unified configuration object attached to a
//! workflow function. Every field is optional so that partial option sets can
//! be layered on top of each other with [`FunctionOptions::overlay`].

use serde::{Deserialize, Serialize};

use crate::context::MiddlewareHandle;

/// The condition that causes a function to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trigger {
    /// Run when a named event is received, optionally filtered by an expression.
    Event {
        event: String,
        #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
        expression: Option<String>,
    },
    /// Run on a cron schedule.
    Cron { cron: String },
}

impl Trigger {
    /// Create an event trigger without a filter expression.
    pub fn event(name: impl Into<String>) -> Self {
        Self::Event {
            event: name.into(),
            expression: None,
        }
    }

    /// Create a cron trigger.
    pub fn cron(schedule: impl Into<String>) -> Self {
        Self::Cron { cron: schedule.into() }
    }

    /// Human-readable description used in logs.
    pub fn describe(&self) -> String {
        match self {
            Trigger::Event { event, .. } => format!("event:{event}"),
            Trigger::Cron { cron } => format!("cron:{cron}"),
        }
    }
}

/// Scope a concurrency limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyScope {
    Fn,
    Env,
    Account,
}

/// Maximum number of concurrently executing steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyPolicy {
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ConcurrencyScope>,
}

impl ConcurrencyPolicy {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            key: None,
            scope: None,
        }
    }
}

/// Hard rate limit: runs over the limit within the period are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Throttle: runs over the limit are queued rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottlePolicy {
    pub limit: u32,
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Debounce: delay execution until no new events arrive for `period`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebouncePolicy {
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Batch several events into one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEventsPolicy {
    pub max_size: u32,
    pub timeout: String,
}

/// Cancel running invocations when a matching event arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOn {
    pub event: String,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Start and finish timeouts, expressed as duration strings ("10s", "1h").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
}

/// Priority expression evaluated by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityPolicy {
    pub run: String,
}

/// Unified function configuration.
///
/// Trigger information may be given as a singular `trigger`, a `triggers`
/// list, or the legacy `event`/`cron` fields; the registration service
/// resolves them in that order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Trigger>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<ConcurrencyPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottlePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce: Option<DebouncePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_events: Option<BatchEventsPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_on: Option<Vec<CancelOn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<Timeouts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency: Option<String>,
    /// SDK middleware attached to this function. Never serialized.
    #[serde(skip)]
    pub middleware: Option<Vec<MiddlewareHandle>>,
}

impl FunctionOptions {
    /// Options for a function triggered by a single event.
    pub fn for_event(event: impl Into<String>) -> Self {
        Self {
            trigger: Some(Trigger::event(event)),
            ..Default::default()
        }
    }

    /// Options for a function triggered by a cron schedule.
    pub fn for_cron(schedule: impl Into<String>) -> Self {
        Self {
            trigger: Some(Trigger::cron(schedule)),
            ..Default::default()
        }
    }

    /// Set an explicit function id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Copy every field that is set in `other` onto `self`.
    ///
    /// Fields absent in `other` are left untouched, so overlaying is a
    /// field-level merge rather than a replacement.
    pub fn overlay(&mut self, other: &FunctionOptions) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field.clone();
                    }
                )*
            };
        }
        take!(
            id,
            name,
            trigger,
            triggers,
            event,
            cron,
            concurrency,
            rate_limit,
            throttle,
            debounce,
            retries,
            batch_events,
            cancel_on,
            timeouts,
            priority,
            idempotency,
            middleware,
        );
    }

    /// Resolve the trigger: `trigger`, then `triggers[0]`, then legacy `event`, then legacy `cron`.
    pub fn resolve_trigger(&self) -> Option<Trigger> {
        if let Some(trigger) = &self.trigger {
            return Some(trigger.clone());
        }
        if let Some(first) = self.triggers.as_ref().and_then(|triggers| triggers.first()) {
            return Some(first.clone());
        }
        if let Some(event) = &self.event {
            return Some(Trigger::event(event.clone()));
        }
        self.cron.as_ref().map(|cron| Trigger::cron(cron.clone()))
    }

    /// Names of the attached middleware, in application order.
    pub fn middleware_names(&self) -> Vec<String> {
        self.middleware
            .as_ref()
            .map(|list| list.iter().map(|handle| handle.name().to_string()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_keeps_fields_missing_from_other() {
        let mut base = FunctionOptions::for_event("app/user.created").with_id("welcome");
        base.retries = Some(5);

        let update = FunctionOptions {
            throttle: Some(ThrottlePolicy {
                limit: 10,
                period: "1m".into(),
                burst: None,
                key: None,
            }),
            ..Default::default()
        };
        base.overlay(&update);

        assert_eq!(base.id.as_deref(), Some("welcome"));
        assert_eq!(base.retries, Some(5));
        assert_eq!(base.throttle.as_ref().map(|t| t.limit), Some(10));
    }

    #[test]
    fn resolve_trigger_priority_order() {
        let mut options = FunctionOptions {
            event: Some("legacy/event".into()),
            cron: Some("0 * * * *".into()),
            ..Default::default()
        };
        assert_eq!(options.resolve_trigger(), Some(Trigger::event("legacy/event")));

        options.triggers = Some(vec![Trigger::event("list/first"), Trigger::event("list/second")]);
        assert_eq!(options.resolve_trigger(), Some(Trigger::event("list/first")));

        options.trigger = Some(Trigger::cron("*/5 * * * *"));
        assert_eq!(options.resolve_trigger(), Some(Trigger::cron("*/5 * * * *")));
    }

    #[test]
    fn resolve_trigger_falls_back_to_legacy_cron() {
        let options = FunctionOptions {
            cron: Some("0 0 * * *".into()),
            ..Default::default()
        };
        assert_eq!(options.resolve_trigger(), Some(Trigger::cron("0 0 * * *")));
        assert_eq!(FunctionOptions::default().resolve_trigger(), None);
    }

    #[test]
    fn serializes_with_camel_case_and_untagged_triggers() {
        let mut options = FunctionOptions::for_event("shop/order.placed").with_id("process-order");
        options.rate_limit = Some(RateLimitPolicy {
            limit: 5,
            period: "1h".into(),
            key: Some("event.data.customerId".into()),
        });

        let json = serde_json::to_value(&options).expect("serialize options");
        assert_eq!(json["trigger"]["event"], "shop/order.placed");
        assert_eq!(json["rateLimit"]["limit"], 5);
        assert!(json.get("middleware").is_none());
        assert!(json.get("retries").is_none());
    }

    #[test]
    fn deserializes_cron_trigger_from_yaml() {
        let yaml = "id: nightly\ntrigger:\n  cron: \"0 3 * * *\"\nretries: 2\n";
        let options: FunctionOptions = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(options.trigger, Some(Trigger::cron("0 3 * * *")));
        assert_eq!(options.retries, Some(2));
    }
}
