//! Error types for the workflow SDK surface.

use thiserror::Error;

/// Errors raised by the client, function builder and serve handler.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Invalid client configuration: {reason}")]
    InvalidClient { reason: String },

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid function '{id}': {reason}")]
    InvalidFunction { id: String, reason: String },

    #[error("Invalid trigger for function '{id}': {reason}")]
    InvalidTrigger { id: String, reason: String },

    #[error("An event key is required to send events outside development mode")]
    MissingEventKey,

    #[error("Cannot determine the serve URL; configure a serve host or send a Host header")]
    MissingServeHost,

    #[error("Function not found: {id}")]
    FunctionNotFound { id: String },

    #[error("Bad request: {reason}")]
    BadRequest { reason: String },

    #[error("Event send failed with status {status}: {body}")]
    Send { status: u16, body: String },

    #[error("Function sync failed with status {status}: {body}")]
    Sync { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl SdkError {
    pub fn invalid_client(reason: impl Into<String>) -> Self {
        Self::InvalidClient { reason: reason.into() }
    }

    pub fn invalid_base_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBaseUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_function(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFunction {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_trigger(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTrigger {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn function_not_found(id: impl Into<String>) -> Self {
        Self::FunctionNotFound { id: id.into() }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest { reason: reason.into() }
    }
}
