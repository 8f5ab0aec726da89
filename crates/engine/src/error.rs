use stepwire_registry::MetadataError;
use stepwire_sdk::SdkError;
use stepwire_types::HandlerShape;
use thiserror::Error;

/// Errors raised by the registration service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("function '{id}' has no trigger; set trigger, triggers, event or cron")]
    MissingTrigger { id: String },

    #[error("function '{id}' is already registered")]
    DuplicateFunction { id: String },

    #[error("configuration for '{app_id}' has no base URL")]
    MissingBaseUrl { app_id: String },

    #[error("function list lock poisoned: {0}")]
    Lock(String),
}

/// Errors raised while registering one discovered method.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("'{method}' is registered as {declared} but its method table entry is {actual}")]
    ShapeMismatch {
        method: String,
        declared: HandlerShape,
        actual: HandlerShape,
    },
}
