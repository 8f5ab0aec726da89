//! Environment defaults and the user-over-defaults merge.

use url::Url;

use crate::model::{Environment, HealthConfig, MonitoringConfig, StepwireConfig, TracingConfig};

/// Route serving the executor endpoint when `path` is not set.
pub const DEFAULT_SERVE_PATH: &str = "/api/stepwire";

const LOCAL_BASE_URL: &str = "http://localhost:8288";
const CLOUD_BASE_URL: &str = "https://api.stepwire.io";

/// Defaults for one environment. `id` and credentials are left empty.
pub fn environment_defaults(environment: Environment) -> StepwireConfig {
    let (base_url, metrics_interval_ms, check_interval_ms, monitoring_enabled) = match environment {
        Environment::Development => (LOCAL_BASE_URL, 10_000, 30_000, true),
        Environment::Test => (LOCAL_BASE_URL, 60_000, 60_000, false),
        Environment::Production => (CLOUD_BASE_URL, 60_000, 30_000, true),
    };

    StepwireConfig {
        id: String::new(),
        event_key: None,
        signing_key: None,
        base_url: Url::parse(base_url).ok(),
        serve_host: None,
        path: Some(DEFAULT_SERVE_PATH.to_string()),
        environment,
        monitoring: MonitoringConfig {
            enabled: Some(monitoring_enabled),
            metrics_interval_ms: Some(metrics_interval_ms),
            include_default_metrics: Some(true),
            metrics_path: Some("/metrics".to_string()),
        },
        health: HealthConfig {
            enabled: Some(true),
            path: Some("/health".to_string()),
            include_details: Some(!matches!(environment, Environment::Production)),
            check_interval_ms: Some(check_interval_ms),
        },
        tracing: TracingConfig {
            enabled: Some(false),
            service_name: None,
            include_event_data: Some(false),
        },
    }
}

/// Overlay user-supplied fields onto the defaults for the user's environment.
///
/// User values win field by field, including inside the sub-objects.
pub fn merge_with_defaults(user: StepwireConfig) -> StepwireConfig {
    let defaults = environment_defaults(user.environment);

    StepwireConfig {
        id: user.id,
        event_key: user.event_key.or(defaults.event_key),
        signing_key: user.signing_key.or(defaults.signing_key),
        base_url: user.base_url.or(defaults.base_url),
        serve_host: user.serve_host.or(defaults.serve_host),
        path: user.path.or(defaults.path),
        environment: user.environment,
        monitoring: MonitoringConfig {
            enabled: user.monitoring.enabled.or(defaults.monitoring.enabled),
            metrics_interval_ms: user.monitoring.metrics_interval_ms.or(defaults.monitoring.metrics_interval_ms),
            include_default_metrics: user
                .monitoring
                .include_default_metrics
                .or(defaults.monitoring.include_default_metrics),
            metrics_path: user.monitoring.metrics_path.or(defaults.monitoring.metrics_path),
        },
        health: HealthConfig {
            enabled: user.health.enabled.or(defaults.health.enabled),
            path: user.health.path.or(defaults.health.path),
            include_details: user.health.include_details.or(defaults.health.include_details),
            check_interval_ms: user.health.check_interval_ms.or(defaults.health.check_interval_ms),
        },
        tracing: TracingConfig {
            enabled: user.tracing.enabled.or(defaults.tracing.enabled),
            service_name: user.tracing.service_name.or(defaults.tracing.service_name),
            include_event_data: user.tracing.include_event_data.or(defaults.tracing.include_event_data),
        },
    }
}
