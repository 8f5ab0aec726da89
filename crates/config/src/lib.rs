//! Configuration management for Stepwire.
//!
//! This crate handles parsing, validation, default merging and `${env:NAME}`
//! interpolation of the Stepwire settings. A configuration is resolved once at
//! startup and shared read-only afterwards.

mod defaults;
mod interpolation;
mod io;
mod model;
mod validation;

pub use defaults::{DEFAULT_SERVE_PATH, environment_defaults, merge_with_defaults};
pub use interpolation::{InterpolationError, interpolate_value};
pub use io::{ENV_CONFIG_PATH, default_config_path, load_config, load_config_from_env, load_config_from_path, resolve_config};
pub use model::{ConfigError, Environment, HealthConfig, MonitoringConfig, REDACTED, StepwireConfig, TracingConfig};
pub use validation::{FieldError, ValidationError, validate_app_id, validate_config};
