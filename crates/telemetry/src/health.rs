//! Health reporting.
//!
//! `HealthService` runs its built-in checks plus any registered
//! [`HealthIndicator`]s and folds them into one [`HealthReport`]. The overall
//! status is the worst component status. The last report is cached so the
//! HTTP layer can serve it without re-running checks.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::monitoring::{BackgroundTask, MonitoringService};

/// Aggregate error rate (percent) at or above which executions are degraded.
pub const DEGRADED_ERROR_RATE: f64 = 50.0;

/// Status of one check or of the whole report. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(label)
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub duration_ms: u64,
}

impl HealthCheck {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthState::Healthy)
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, HealthState::Degraded).with_message(message)
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, HealthState::Unhealthy).with_message(message)
    }

    fn with_status(name: impl Into<String>, status: HealthState) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
            details: None,
            duration_ms: 0,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Result of one full health pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthState,
    pub timestamp: DateTime<Utc>,
    pub uptime_ms: u64,
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }

    pub fn check(&self, name: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|check| check.name == name)
    }
}

/// A custom health check.
#[async_trait]
pub trait HealthIndicator: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> HealthCheck;
}

/// What the health service needs to know about registered functions.
pub trait FunctionInventory: Send + Sync {
    fn app_id(&self) -> &str;

    fn function_ids(&self) -> Vec<String>;
}

#[derive(Default)]
struct IndicatorState {
    indicators: Vec<Arc<dyn HealthIndicator>>,
    last_report: Option<HealthReport>,
}

/// Aggregates built-in and custom health checks.
#[derive(Clone)]
pub struct HealthService {
    state: Arc<Mutex<IndicatorState>>,
    monitoring: Option<MonitoringService>,
    inventory: Option<Arc<dyn FunctionInventory>>,
    include_details: bool,
    started_at: Instant,
}

impl fmt::Debug for HealthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthService")
            .field("monitoring", &self.monitoring.is_some())
            .field("inventory", &self.inventory.is_some())
            .field("include_details", &self.include_details)
            .finish()
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(IndicatorState::default())),
            monitoring: None,
            inventory: None,
            include_details: true,
            started_at: Instant::now(),
        }
    }

    /// Enable the execution error-rate check.
    pub fn with_monitoring(mut self, monitoring: MonitoringService) -> Self {
        self.monitoring = Some(monitoring);
        self
    }

    /// Enable the function and client checks.
    pub fn with_inventory(mut self, inventory: Arc<dyn FunctionInventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Whether messages and details survive into the report.
    pub fn include_details(mut self, include: bool) -> Self {
        self.include_details = include;
        self
    }

    pub async fn add_indicator(&self, indicator: Arc<dyn HealthIndicator>) {
        let mut state = self.state.lock().await;
        debug!(indicator = indicator.name(), "health indicator registered");
        state.indicators.push(indicator);
    }

    /// Run every check and cache the resulting report.
    pub async fn check(&self) -> HealthReport {
        let mut checks = Vec::new();
        if let Some(inventory) = &self.inventory {
            checks.push(timed(|| functions_check(inventory.as_ref())));
            checks.push(timed(|| client_check(inventory.as_ref())));
        }
        if let Some(monitoring) = &self.monitoring {
            checks.push(timed(|| executions_check(monitoring)));
        }

        let indicators = self.state.lock().await.indicators.clone();
        for indicator in indicators {
            let started = Instant::now();
            let mut check = indicator.check().await;
            check.duration_ms = started.elapsed().as_millis() as u64;
            checks.push(check);
        }

        let status = checks.iter().map(|check| check.status).max().unwrap_or(HealthState::Healthy);
        if !self.include_details {
            for check in &mut checks {
                check.message = None;
                check.details = None;
            }
        }
        let report = HealthReport {
            status,
            timestamp: Utc::now(),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            checks,
        };
        if report.status != HealthState::Healthy {
            warn!(status = %report.status, "health check reported problems");
        }
        self.state.lock().await.last_report = Some(report.clone());
        report
    }

    /// The report from the most recent pass, if any.
    pub async fn last_report(&self) -> Option<HealthReport> {
        self.state.lock().await.last_report.clone()
    }

    /// Spawn a periodic health pass on the current tokio runtime.
    pub fn start_checks(&self, interval: Duration) -> BackgroundTask {
        let cancellation_token = CancellationToken::new();
        let shutdown = cancellation_token.child_token();
        let service = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = service.check().await;
                        debug!(status = %report.status, checks = report.checks.len(), "periodic health check");
                    }
                }
            }
        });
        BackgroundTask::new(cancellation_token, handle)
    }
}

fn timed(check: impl FnOnce() -> HealthCheck) -> HealthCheck {
    let started = Instant::now();
    let mut result = check();
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

fn functions_check(inventory: &dyn FunctionInventory) -> HealthCheck {
    let ids = inventory.function_ids();
    if ids.is_empty() {
        return HealthCheck::degraded("functions", "no workflow functions registered");
    }
    HealthCheck::healthy("functions")
        .with_message(format!("{} function(s) registered", ids.len()))
        .with_details(json!({ "functions": ids }))
}

fn client_check(inventory: &dyn FunctionInventory) -> HealthCheck {
    if inventory.app_id().trim().is_empty() {
        return HealthCheck::unhealthy("client", "client has no app id");
    }
    HealthCheck::healthy("client").with_details(json!({ "appId": inventory.app_id() }))
}

fn executions_check(monitoring: &MonitoringService) -> HealthCheck {
    match monitoring.summary() {
        Ok(summary) if summary.error_rate >= DEGRADED_ERROR_RATE => HealthCheck::degraded(
            "executions",
            format!("error rate {:.1}% is at or above {DEGRADED_ERROR_RATE}%", summary.error_rate),
        )
        .with_details(json!({ "errorRate": summary.error_rate, "totalExecutions": summary.total_executions })),
        Ok(summary) => HealthCheck::healthy("executions")
            .with_details(json!({ "errorRate": summary.error_rate, "totalExecutions": summary.total_executions })),
        Err(error) => HealthCheck::unhealthy("executions", error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{ExecutionRecord, ExecutionRecorder};

    struct Inventory {
        app_id: &'static str,
        ids: Vec<String>,
    }

    impl FunctionInventory for Inventory {
        fn app_id(&self) -> &str {
            self.app_id
        }

        fn function_ids(&self) -> Vec<String> {
            self.ids.clone()
        }
    }

    struct Database {
        up: bool,
    }

    #[async_trait]
    impl HealthIndicator for Database {
        fn name(&self) -> &str {
            "database"
        }

        async fn check(&self) -> HealthCheck {
            if self.up {
                HealthCheck::healthy("database")
            } else {
                HealthCheck::unhealthy("database", "connection refused")
            }
        }
    }

    fn inventory(ids: &[&str]) -> Arc<dyn FunctionInventory> {
        Arc::new(Inventory {
            app_id: "shop",
            ids: ids.iter().map(|id| id.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn healthy_when_functions_registered_and_no_failures() {
        let health = HealthService::new()
            .with_inventory(inventory(&["orders.process"]))
            .with_monitoring(MonitoringService::new());
        let report = health.check().await;

        assert!(report.is_healthy());
        assert_eq!(report.checks.len(), 3);
        assert_eq!(report.check("functions").and_then(|c| c.message.as_deref()), Some("1 function(s) registered"));
        assert_eq!(health.last_report().await, Some(report));
    }

    #[tokio::test]
    async fn high_error_rate_degrades_the_report() {
        let monitoring = MonitoringService::new();
        monitoring.record_execution(ExecutionRecord::failure("f", Duration::from_millis(1), "x")).unwrap();
        monitoring.record_execution(ExecutionRecord::success("f", Duration::from_millis(1))).unwrap();
        let health = HealthService::new().with_inventory(inventory(&["f"])).with_monitoring(monitoring);

        let report = health.check().await;
        assert_eq!(report.status, HealthState::Degraded);
        assert_eq!(report.check("executions").map(|c| c.status), Some(HealthState::Degraded));
    }

    #[tokio::test]
    async fn worst_indicator_wins_and_details_can_be_hidden() {
        let health = HealthService::new().with_inventory(inventory(&[])).include_details(false);
        health.add_indicator(Arc::new(Database { up: false })).await;

        let report = health.check().await;
        assert_eq!(report.status, HealthState::Unhealthy);
        assert_eq!(report.check("functions").map(|c| c.status), Some(HealthState::Degraded));
        assert!(report.checks.iter().all(|check| check.message.is_none() && check.details.is_none()));
    }

    #[tokio::test]
    async fn periodic_checks_populate_last_report() {
        let health = HealthService::new();
        health.add_indicator(Arc::new(Database { up: true })).await;
        let task = health.start_checks(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(40)).await;
        task.stop().await;

        let report = health.last_report().await.unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.checks[0].name, "database");
    }
}
