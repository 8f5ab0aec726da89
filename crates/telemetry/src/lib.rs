//! Telemetry services for Stepwire.
//!
//! - [`MonitoringService`] keeps per-function execution statistics and named
//!   metric samples, and exports them as text, JSON or a compact summary.
//! - [`HealthService`] aggregates built-in and custom health checks.
//! - [`TraceService`] parses, creates and propagates `traceparent` contexts
//!   through event payloads.

mod error;
mod health;
mod monitoring;
mod propagation;

pub use error::TelemetryError;
pub use health::{FunctionInventory, HealthCheck, HealthIndicator, HealthService, HealthState, HealthReport, DEGRADED_ERROR_RATE};
pub use monitoring::{
    BackgroundTask, DURATION_WINDOW, ExecutionRecord, ExecutionRecorder, FunctionMetrics, MetricKind, MetricSample, MetricsSummary,
    MonitoringService,
};
pub use propagation::{TRACEPARENT_FIELD, TraceContext, TraceService};
