use thiserror::Error;

/// Errors raised while recording or reading registry state.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("'{type_name}::{method}' is already registered as a workflow function")]
    DuplicateFunction { type_name: String, method: String },

    #[error("method name cannot be empty for '{type_name}'")]
    EmptyMethodName { type_name: String },

    #[error("method table for '{table}' cannot be attached to an instance of '{instance}'")]
    MethodTableMismatch { instance: String, table: String },

    #[error("'{type_name}' already has a method table with a different method set")]
    ConflictingMethodTable { type_name: String },

    #[error("registry lock poisoned: {0}")]
    Lock(String),

    #[error("instance registry unavailable: {reason}")]
    Unavailable { reason: String },
}

impl MetadataError {
    pub fn duplicate_function(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self::DuplicateFunction {
            type_name: type_name.into(),
            method: method.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }
}
