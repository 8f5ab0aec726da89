use stepwire_config::ConfigError;
use stepwire_engine::ServiceError;
use thiserror::Error;

/// Errors raised while building or serving a module.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("options factory failed: {reason}")]
    Factory { reason: String },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Task(String),
}

impl ModuleError {
    pub fn factory(error: anyhow::Error) -> Self {
        Self::Factory {
            reason: format!("{error:#}"),
        }
    }
}
