//! Configuration loading from files and the process environment.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use dirs_next::{config_dir, home_dir};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::{
    defaults::merge_with_defaults,
    interpolation::interpolate_value,
    model::{ConfigError, StepwireConfig},
    validation::validate_config,
};

/// Overrides the location of the config file.
pub const ENV_CONFIG_PATH: &str = "STEPWIRE_CONFIG_PATH";
const ENV_APP_ID: &str = "STEPWIRE_APP_ID";
const ENV_EVENT_KEY: &str = "STEPWIRE_EVENT_KEY";
const ENV_SIGNING_KEY: &str = "STEPWIRE_SIGNING_KEY";
const ENV_BASE_URL: &str = "STEPWIRE_BASE_URL";
const ENV_SERVE_HOST: &str = "STEPWIRE_SERVE_HOST";
const ENV_SERVE_PATH: &str = "STEPWIRE_SERVE_PATH";
const ENV_ENVIRONMENT: &str = "STEPWIRE_ENV";

/// Returns the default path for the Stepwire configuration file.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = env_value(ENV_CONFIG_PATH) {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("stepwire").join("config.json")
}

/// Load the config file at `path` (or the default path), apply environment
/// overrides, merge defaults and validate.
///
/// A missing file is not an error; the environment alone may be enough.
pub fn load_config(path: Option<&Path>) -> Result<StepwireConfig, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let file_config = if path.exists() {
        load_config_from_path(&path)?
    } else {
        debug!(path = %path.display(), "config file not found; using environment only");
        StepwireConfig::default()
    };
    let config = apply_env_overrides(file_config)?;
    resolve_config(config)
}

/// Parse a JSON or YAML config file, interpolating `${env:NAME}` placeholders.
///
/// The format is chosen by extension; `.yaml` and `.yml` are YAML, anything
/// else is JSON. The result is neither merged with defaults nor validated.
pub fn load_config_from_path(path: &Path) -> Result<StepwireConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut raw: Value = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };
    interpolate_value(&mut raw)?;
    let config = serde_json::from_value(raw)?;
    info!(path = %path.display(), "loaded configuration file");
    Ok(config)
}

/// Build a config from `STEPWIRE_*` environment variables alone.
pub fn load_config_from_env() -> Result<StepwireConfig, ConfigError> {
    apply_env_overrides(StepwireConfig::default())
}

/// Merge defaults for the config's environment and validate the result.
pub fn resolve_config(config: StepwireConfig) -> Result<StepwireConfig, ConfigError> {
    let merged = merge_with_defaults(config);
    validate_config(&merged)?;
    Ok(merged)
}

fn apply_env_overrides(mut config: StepwireConfig) -> Result<StepwireConfig, ConfigError> {
    if let Some(id) = env_value(ENV_APP_ID) {
        config.id = id;
    }
    if let Some(key) = env_value(ENV_EVENT_KEY) {
        config.event_key = Some(key);
    }
    if let Some(key) = env_value(ENV_SIGNING_KEY) {
        config.signing_key = Some(key);
    }
    if let Some(url) = env_value(ENV_BASE_URL) {
        config.base_url = Some(Url::parse(&url)?);
    }
    if let Some(url) = env_value(ENV_SERVE_HOST) {
        config.serve_host = Some(Url::parse(&url)?);
    }
    if let Some(path) = env_value(ENV_SERVE_PATH) {
        config.path = Some(path);
    }
    if let Some(environment) = env_value(ENV_ENVIRONMENT) {
        config.environment = environment.parse()?;
    }
    Ok(config)
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    match trimmed.strip_prefix("~/") {
        Some(rest) => home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest),
        None => PathBuf::from(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Environment;
    use std::io::Write;

    const ALL_VARS: [&str; 8] = [
        ENV_CONFIG_PATH,
        ENV_APP_ID,
        ENV_EVENT_KEY,
        ENV_SIGNING_KEY,
        ENV_BASE_URL,
        ENV_SERVE_HOST,
        ENV_SERVE_PATH,
        ENV_ENVIRONMENT,
    ];

    /// Every Stepwire variable unset except the given overrides.
    fn env_with(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
        ALL_VARS
            .iter()
            .map(|name| {
                let value = overrides.iter().find(|(key, _)| key == name).map(|(_, value)| *value);
                (*name, value)
            })
            .collect()
    }

    #[test]
    fn default_path_honors_environment_override() {
        temp_env::with_var(ENV_CONFIG_PATH, Some("/tmp/stepwire/custom.json"), || {
            assert_eq!(default_config_path(), PathBuf::from("/tmp/stepwire/custom.json"));
        });
    }

    #[test]
    fn loads_yaml_with_interpolation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "id: shop\neventKey: \"${{env:STEPWIRE_TEST_YAML_KEY}}\"\nenvironment: test\nmonitoring:\n  metricsIntervalMs: 2000\n"
        )
        .unwrap();

        temp_env::with_var("STEPWIRE_TEST_YAML_KEY", Some("evt-yaml"), || {
            let config = load_config_from_path(file.path()).expect("yaml loads");
            assert_eq!(config.id, "shop");
            assert_eq!(config.event_key.as_deref(), Some("evt-yaml"));
            assert_eq!(config.environment, Environment::Test);
            assert_eq!(config.monitoring.metrics_interval_ms, Some(2000));
        });
    }

    #[test]
    fn load_config_merges_file_env_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepwire.json");
        fs::write(&path, r#"{ "id": "from-file", "path": "/hooks/stepwire" }"#).unwrap();

        temp_env::with_vars(env_with(&[(ENV_APP_ID, "from-env")]), || {
            let config = load_config(Some(&path)).expect("config resolves");
            assert_eq!(config.id, "from-env");
            assert_eq!(config.serve_path(), "/hooks/stepwire");
            assert_eq!(config.metrics_interval_ms(), 10_000);
        });
    }

    #[test]
    fn production_environment_without_keys_fails_validation() {
        let vars = env_with(&[
            (ENV_APP_ID, "shop"),
            (ENV_ENVIRONMENT, "production"),
            (ENV_CONFIG_PATH, "/nonexistent/stepwire.json"),
        ]);
        temp_env::with_vars(vars, || {
            let err = load_config(None).expect_err("production requires keys");
            match err {
                ConfigError::Validation(validation) => {
                    assert!(validation.fields().contains(&"eventKey"));
                    assert!(validation.fields().contains(&"signingKey"));
                }
                other => panic!("unexpected error: {other}"),
            }
        });
    }

    #[test]
    fn malformed_base_url_in_env_is_rejected() {
        temp_env::with_vars(env_with(&[(ENV_BASE_URL, "not a url")]), || {
            assert!(matches!(load_config_from_env(), Err(ConfigError::Url(_))));
        });
    }
}
