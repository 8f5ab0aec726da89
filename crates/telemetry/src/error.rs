use thiserror::Error;

/// Errors raised by the telemetry services.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry state lock poisoned: {0}")]
    Lock(String),

    #[error("invalid traceparent '{header}': {reason}")]
    InvalidTraceParent { header: String, reason: String },

    #[error("metric name cannot be empty")]
    EmptyMetricName,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelemetryError {
    pub fn invalid_traceparent(header: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTraceParent {
            header: header.into(),
            reason: reason.into(),
        }
    }
}
