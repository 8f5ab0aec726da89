//! Data models for Stepwire configuration.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{defaults::DEFAULT_SERVE_PATH, interpolation::InterpolationError, validation::ValidationError};

/// Placeholder written in place of credentials when a config is displayed.
pub const REDACTED: &str = "[REDACTED]";

/// Deployment environment selecting defaults and validation rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Development and test run against a local executor without credentials.
    pub fn is_local(self) -> bool {
        !matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::invalid(format!(
                "unknown environment '{other}' (expected development, test or production)"
            ))),
        }
    }
}

/// Metrics collection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MonitoringConfig {
    pub enabled: Option<bool>,
    /// Interval of the periodic collection timer.
    pub metrics_interval_ms: Option<u64>,
    /// Refresh uptime and registration gauges on each collection tick.
    pub include_default_metrics: Option<bool>,
    /// Route serving the metrics export. Defaults to `/metrics`.
    pub metrics_path: Option<String>,
}

/// Health reporting settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HealthConfig {
    pub enabled: Option<bool>,
    pub path: Option<String>,
    pub include_details: Option<bool>,
    pub check_interval_ms: Option<u64>,
}

/// Trace-context propagation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TracingConfig {
    pub enabled: Option<bool>,
    pub service_name: Option<String>,
    /// Copy event payload fields onto function spans.
    pub include_event_data: Option<bool>,
}

/// Stepwire settings as written by the user.
///
/// Optional fields left unset are filled by
/// [`merge_with_defaults`](crate::merge_with_defaults) for the configured
/// [`Environment`]; the accessors below return the effective values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StepwireConfig {
    /// Application identifier registered with the executor.
    pub id: String,
    pub event_key: Option<String>,
    pub signing_key: Option<String>,
    /// Executor base URL.
    pub base_url: Option<Url>,
    /// Public origin of this service, used when syncing functions.
    pub serve_host: Option<Url>,
    /// Route serving the executor endpoint.
    pub path: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl StepwireConfig {
    pub fn new(id: impl Into<String>, environment: Environment) -> Self {
        Self {
            id: id.into(),
            environment,
            ..Self::default()
        }
    }

    pub fn serve_path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_SERVE_PATH)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled.unwrap_or(false)
    }

    pub fn metrics_interval_ms(&self) -> u64 {
        self.monitoring.metrics_interval_ms.unwrap_or(60_000)
    }

    pub fn metrics_path(&self) -> &str {
        self.monitoring.metrics_path.as_deref().unwrap_or("/metrics")
    }

    pub fn health_enabled(&self) -> bool {
        self.health.enabled.unwrap_or(false)
    }

    pub fn health_path(&self) -> &str {
        self.health.path.as_deref().unwrap_or("/health")
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing.enabled.unwrap_or(false)
    }

    /// Copy of the config with credentials replaced by [`REDACTED`].
    pub fn redacted(&self) -> Self {
        let mask = |value: &Option<String>| value.as_ref().map(|_| REDACTED.to_string());
        Self {
            event_key: mask(&self.event_key),
            signing_key: mask(&self.signing_key),
            ..self.clone()
        }
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_camel_case_config() {
        let json = r#"{
          "id": "shop",
          "eventKey": "evt",
          "baseUrl": "https://executor.example.com",
          "environment": "production",
          "monitoring": { "enabled": true, "metricsIntervalMs": 15000 },
          "health": { "path": "/healthz", "includeDetails": true }
        }"#;

        let cfg: StepwireConfig = serde_json::from_str(json).expect("config deserializes");
        assert_eq!(cfg.id, "shop");
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.metrics_interval_ms(), 15000);
        assert_eq!(cfg.health_path(), "/healthz");
        assert_eq!(cfg.base_url.as_ref().unwrap().as_str(), "https://executor.example.com/");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{ "id": "shop", "eventKye": "typo" }"#;
        assert!(serde_json::from_str::<StepwireConfig>(json).is_err());
    }

    #[test]
    fn redacted_masks_credentials_only() {
        let mut cfg = StepwireConfig::new("shop", Environment::Production);
        cfg.event_key = Some("evt-secret".into());
        let redacted = cfg.redacted();
        assert_eq!(redacted.event_key.as_deref(), Some(REDACTED));
        assert_eq!(redacted.signing_key, None);
        assert_eq!(redacted.id, "shop");
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Development".parse::<Environment>().unwrap(), Environment::Development);
        assert!("staging".parse::<Environment>().is_err());
    }
}
