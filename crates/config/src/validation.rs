//! Configuration validation.
//!
//! Every rule is checked and all failures are reported together, so a user
//! fixing a config file sees the complete list at once.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::model::{Environment, StepwireConfig};

/// Smallest accepted interval for timers.
const MIN_INTERVAL_MS: u64 = 1_000;

static APP_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("app id regex should compile"));

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All rule failures for one configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid {environment} configuration: {}", join_errors(.errors))]
pub struct ValidationError {
    pub environment: Environment,
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// Names of the failing fields, in rule order.
    pub fn fields(&self) -> Vec<&str> {
        self.errors.iter().map(|error| error.field.as_str()).collect()
    }
}

/// Validate the base schema, then the rules of the config's environment.
pub fn validate_config(config: &StepwireConfig) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    validate_base(config, &mut errors);
    if config.environment == Environment::Production {
        validate_production(config, &mut errors);
    }

    if errors.is_empty() {
        debug!(app_id = %config.id, environment = %config.environment, "validated configuration");
        Ok(())
    } else {
        Err(ValidationError {
            environment: config.environment,
            errors,
        })
    }
}

/// Validate an application identifier.
pub fn validate_app_id(id: &str) -> Result<(), FieldError> {
    if id.trim().is_empty() {
        return Err(FieldError::new("id", "is required"));
    }
    if !APP_ID_REGEX.is_match(id) {
        return Err(FieldError::new(
            "id",
            "must contain only letters, numbers, dots, underscores, and hyphens",
        ));
    }
    Ok(())
}

fn validate_base(config: &StepwireConfig, errors: &mut Vec<FieldError>) {
    if let Err(error) = validate_app_id(&config.id) {
        errors.push(error);
    }

    if let Some(url) = &config.base_url {
        check_http_url("baseUrl", url, errors);
    }
    if let Some(url) = &config.serve_host {
        check_http_url("serveHost", url, errors);
    }

    if let Some(path) = &config.path {
        check_route("path", path, errors);
    }
    if let Some(path) = &config.health.path {
        check_route("health.path", path, errors);
    }
    if let Some(path) = &config.monitoring.metrics_path {
        check_route("monitoring.metricsPath", path, errors);
    }

    if let Some(interval) = config.monitoring.metrics_interval_ms {
        check_interval("monitoring.metricsIntervalMs", interval, errors);
    }
    if let Some(interval) = config.health.check_interval_ms {
        check_interval("health.checkIntervalMs", interval, errors);
    }
}

fn validate_production(config: &StepwireConfig, errors: &mut Vec<FieldError>) {
    if is_blank(config.event_key.as_deref()) {
        errors.push(FieldError::new("eventKey", "is required in production"));
    }
    if is_blank(config.signing_key.as_deref()) {
        errors.push(FieldError::new("signingKey", "is required in production"));
    }
    if config.monitoring.enabled != Some(true) {
        errors.push(FieldError::new("monitoring.enabled", "must be true in production"));
    }
}

fn check_http_url(field: &str, url: &Url, errors: &mut Vec<FieldError>) {
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        errors.push(FieldError::new(
            field,
            format!("unsupported URL scheme: {scheme} (expected http/https)"),
        ));
    }
}

fn check_route(field: &str, path: &str, errors: &mut Vec<FieldError>) {
    if !path.starts_with('/') {
        errors.push(FieldError::new(field, format!("'{path}' must start with '/'")));
    }
}

fn check_interval(field: &str, interval: u64, errors: &mut Vec<FieldError>) {
    if interval < MIN_INTERVAL_MS {
        errors.push(FieldError::new(
            field,
            format!("must be at least {MIN_INTERVAL_MS}ms, got {interval}ms"),
        ));
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).is_none_or(str::is_empty)
}
