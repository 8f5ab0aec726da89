//! `${env:NAME}` interpolation for raw configuration documents.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

static ENV_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{env:([\w+-]*)}").expect("env interpolation regex should compile"));

/// Replace every `${env:NAME}` placeholder in the string leaves of `value`.
///
/// Object keys are left untouched. A placeholder naming an unset variable is
/// an error.
pub fn interpolate_value(value: &mut Value) -> Result<(), InterpolationError> {
    match value {
        Value::String(text) => {
            if text.contains("${env:") {
                *text = interpolate_string(text)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                interpolate_value(item)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                interpolate_value(item)?;
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

fn interpolate_string(value: &str) -> Result<String, InterpolationError> {
    let mut resolved = Vec::new();
    for cap in ENV_PATTERN.captures_iter(value) {
        let var_name = cap[1].to_string();
        let env_value = std::env::var(&var_name).map_err(|_| InterpolationError::MissingEnvVar { name: var_name.clone() })?;
        debug!("Interpolated env var: {} -> [REDACTED]", var_name);
        resolved.push((cap[0].to_string(), env_value));
    }

    let mut result = value.to_string();
    for (placeholder, env_value) in resolved {
        result = result.replace(&placeholder, &env_value);
    }
    Ok(result)
}

/// Errors that can occur during interpolation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("Missing environment variable: {name}")]
    MissingEnvVar { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replaces_nested_placeholders() {
        temp_env::with_vars(
            [("STEPWIRE_TEST_EVENT_KEY", Some("evt-123")), ("STEPWIRE_TEST_HOST", Some("shop.example.com"))],
            || {
                let mut value = json!({
                    "eventKey": "${env:STEPWIRE_TEST_EVENT_KEY}",
                    "serveHost": "https://${env:STEPWIRE_TEST_HOST}",
                    "monitoring": { "enabled": true },
                    "tags": ["${env:STEPWIRE_TEST_HOST}"]
                });
                interpolate_value(&mut value).expect("interpolation succeeds");
                assert_eq!(value["eventKey"], "evt-123");
                assert_eq!(value["serveHost"], "https://shop.example.com");
                assert_eq!(value["tags"][0], "shop.example.com");
                assert_eq!(value["monitoring"]["enabled"], true);
            },
        );
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var("STEPWIRE_TEST_UNSET", None::<&str>, || {
            let mut value = json!({ "signingKey": "${env:STEPWIRE_TEST_UNSET}" });
            assert_eq!(
                interpolate_value(&mut value),
                Err(InterpolationError::MissingEnvVar {
                    name: "STEPWIRE_TEST_UNSET".into()
                })
            );
        });
    }
}
