//! Function execution metrics.
//!
//! The `MonitoringService` owns two maps behind one mutex:
//!
//! - per-function [`FunctionMetrics`], created on registration or on the first
//!   recorded execution and only removed by [`MonitoringService::clear_all`]
//! - named [`MetricSample`]s keyed by name plus sorted labels, where the last
//!   write for a label combination wins
//!
//! Exports are read-only projections of that state.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    fmt::Write as _,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TelemetryError;

/// Number of recent durations kept per function.
pub const DURATION_WINDOW: usize = 100;

/// Outcome of one handler execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub function_id: String,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn success(function_id: impl Into<String>, duration: Duration) -> Self {
        Self {
            function_id: function_id.into(),
            duration,
            success: true,
            error: None,
        }
    }

    pub fn failure(function_id: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            function_id: function_id.into(),
            duration,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Sink for execution outcomes and function registrations.
pub trait ExecutionRecorder: Send + Sync {
    /// Start tracking `function_id`. Calling it again keeps existing counters.
    fn register_function(&self, function_id: &str) -> Result<(), TelemetryError>;

    fn record_execution(&self, record: ExecutionRecord) -> Result<(), TelemetryError>;
}

/// Running statistics for one function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetrics {
    pub function_id: String,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub total_duration_ms: f64,
    pub min_duration_ms: Option<f64>,
    pub max_duration_ms: Option<f64>,
    pub recent_durations_ms: VecDeque<f64>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl FunctionMetrics {
    fn new(function_id: &str) -> Self {
        Self {
            function_id: function_id.to_string(),
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            total_duration_ms: 0.0,
            min_duration_ms: None,
            max_duration_ms: None,
            recent_durations_ms: VecDeque::with_capacity(DURATION_WINDOW),
            last_executed_at: None,
            last_error: None,
        }
    }

    fn record(&mut self, record: &ExecutionRecord) {
        let duration_ms = record.duration.as_secs_f64() * 1000.0;
        self.total_executions += 1;
        if record.success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
            self.last_error = record.error.clone();
        }
        self.total_duration_ms += duration_ms;
        self.min_duration_ms = Some(self.min_duration_ms.map_or(duration_ms, |min| min.min(duration_ms)));
        self.max_duration_ms = Some(self.max_duration_ms.map_or(duration_ms, |max| max.max(duration_ms)));
        self.recent_durations_ms.push_back(duration_ms);
        while self.recent_durations_ms.len() > DURATION_WINDOW {
            self.recent_durations_ms.pop_front();
        }
        self.last_executed_at = Some(Utc::now());
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.total_duration_ms / self.total_executions as f64
    }

    /// Failed share of executions as a percentage, rounded to one decimal.
    pub fn error_rate(&self) -> f64 {
        percentage(self.failed_executions, self.total_executions)
    }
}

/// Kind of a named metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Latest value of a named metric for one label combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    fn key(name: &str, labels: &BTreeMap<String, String>) -> String {
        if labels.is_empty() {
            return name.to_string();
        }
        format!("{name}{{{}}}", format_labels(labels))
    }
}

/// Compact roll-up across all functions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_functions: usize,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub error_rate: f64,
    pub average_duration_ms: f64,
    pub uptime_ms: u64,
}

#[derive(Debug, Default)]
struct MonitoringState {
    functions: HashMap<String, FunctionMetrics>,
    metrics: BTreeMap<String, MetricSample>,
}

/// Handle to a background task stopped through its cancellation token.
#[derive(Debug)]
pub struct BackgroundTask {
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub(crate) fn new(cancellation_token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { cancellation_token, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait for it to exit.
    pub async fn stop(self) {
        self.cancellation_token.cancel();
        if let Err(error) = self.handle.await {
            warn!(error = %error, "background telemetry task failed");
        }
    }
}

/// Per-function statistics plus named metrics.
#[derive(Debug, Clone)]
pub struct MonitoringService {
    state: Arc<Mutex<MonitoringState>>,
    started_at: Instant,
}

impl Default for MonitoringService {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitoringState::default())),
            started_at: Instant::now(),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MonitoringState>, TelemetryError> {
        self.state.lock().map_err(|error| TelemetryError::Lock(error.to_string()))
    }

    /// Statistics for one function.
    pub fn function_metrics(&self, function_id: &str) -> Result<Option<FunctionMetrics>, TelemetryError> {
        Ok(self.lock()?.functions.get(function_id).cloned())
    }

    /// Statistics for every tracked function, sorted by id.
    pub fn all_function_metrics(&self) -> Result<Vec<FunctionMetrics>, TelemetryError> {
        let state = self.lock()?;
        let mut metrics: Vec<FunctionMetrics> = state.functions.values().cloned().collect();
        metrics.sort_by(|a, b| a.function_id.cmp(&b.function_id));
        Ok(metrics)
    }

    /// Ids of every tracked function, sorted.
    pub fn registered_functions(&self) -> Result<Vec<String>, TelemetryError> {
        let mut ids: Vec<String> = self.lock()?.functions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Record a named metric. The last write per name and label set wins.
    pub fn record_metric(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        labels: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), TelemetryError> {
        if name.trim().is_empty() {
            return Err(TelemetryError::EmptyMetricName);
        }
        let labels: BTreeMap<String, String> = labels.into_iter().collect();
        let key = MetricSample::key(name, &labels);
        let sample = MetricSample {
            name: name.to_string(),
            kind,
            value,
            labels,
            timestamp: Utc::now(),
        };
        self.lock()?.metrics.insert(key, sample);
        Ok(())
    }

    /// Add `by` to a counter, starting from zero.
    pub fn increment_counter(&self, name: &str, by: f64, labels: impl IntoIterator<Item = (String, String)>) -> Result<f64, TelemetryError> {
        if name.trim().is_empty() {
            return Err(TelemetryError::EmptyMetricName);
        }
        let labels: BTreeMap<String, String> = labels.into_iter().collect();
        let key = MetricSample::key(name, &labels);
        let mut state = self.lock()?;
        let sample = state.metrics.entry(key).or_insert_with(|| MetricSample {
            name: name.to_string(),
            kind: MetricKind::Counter,
            value: 0.0,
            labels,
            timestamp: Utc::now(),
        });
        sample.value += by;
        sample.timestamp = Utc::now();
        Ok(sample.value)
    }

    pub fn metric(&self, name: &str, labels: impl IntoIterator<Item = (String, String)>) -> Result<Option<MetricSample>, TelemetryError> {
        let labels: BTreeMap<String, String> = labels.into_iter().collect();
        Ok(self.lock()?.metrics.get(&MetricSample::key(name, &labels)).cloned())
    }

    pub fn summary(&self) -> Result<MetricsSummary, TelemetryError> {
        let state = self.lock()?;
        let mut summary = MetricsSummary {
            total_functions: state.functions.len(),
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            error_rate: 0.0,
            average_duration_ms: 0.0,
            uptime_ms: self.uptime_ms(),
        };
        let mut total_duration_ms = 0.0;
        for metrics in state.functions.values() {
            summary.total_executions += metrics.total_executions;
            summary.successful_executions += metrics.successful_executions;
            summary.failed_executions += metrics.failed_executions;
            total_duration_ms += metrics.total_duration_ms;
        }
        summary.error_rate = percentage(summary.failed_executions, summary.total_executions);
        if summary.total_executions > 0 {
            summary.average_duration_ms = total_duration_ms / summary.total_executions as f64;
        }
        Ok(summary)
    }

    /// Text line protocol: one `name{labels} value` line per series, grouped
    /// under `# TYPE` headers.
    pub fn export_text(&self) -> Result<String, TelemetryError> {
        let functions = self.all_function_metrics()?;
        let state = self.lock()?;
        let mut out = String::new();

        let series: [(&str, &str, fn(&FunctionMetrics) -> f64); 5] = [
            ("stepwire_function_executions_total", "counter", |m| m.total_executions as f64),
            ("stepwire_function_successes_total", "counter", |m| m.successful_executions as f64),
            ("stepwire_function_failures_total", "counter", |m| m.failed_executions as f64),
            ("stepwire_function_duration_avg_ms", "gauge", FunctionMetrics::average_duration_ms),
            ("stepwire_function_error_rate", "gauge", FunctionMetrics::error_rate),
        ];
        for (name, kind, value) in series {
            if functions.is_empty() {
                break;
            }
            let _ = writeln!(out, "# TYPE {name} {kind}");
            for metrics in &functions {
                let _ = writeln!(out, "{name}{{function_id=\"{}\"}} {}", escape_label(&metrics.function_id), value(metrics));
            }
        }

        // Keys sort `name{` after `name_suffix`, so group by bare name first.
        let mut families: BTreeMap<&str, Vec<(&str, &MetricSample)>> = BTreeMap::new();
        for (key, sample) in &state.metrics {
            families.entry(sample.name.as_str()).or_default().push((key.as_str(), sample));
        }
        for (name, samples) in families {
            let kind = samples[0].1.kind.as_str();
            let _ = writeln!(out, "# TYPE {name} {kind}");
            for (key, sample) in samples {
                let _ = writeln!(out, "{key} {}", sample.value);
            }
        }
        Ok(out)
    }

    /// Structured export of every function and named metric.
    pub fn export_json(&self) -> Result<Value, TelemetryError> {
        let functions = self.all_function_metrics()?;
        let summary = self.summary()?;
        let metrics: Vec<MetricSample> = self.lock()?.metrics.values().cloned().collect();
        Ok(json!({
            "timestamp": Utc::now(),
            "summary": summary,
            "functions": functions
                .iter()
                .map(|m| {
                    let mut value = serde_json::to_value(m)?;
                    value["averageDurationMs"] = json!(m.average_duration_ms());
                    value["errorRate"] = json!(m.error_rate());
                    Ok(value)
                })
                .collect::<Result<Vec<_>, serde_json::Error>>()?,
            "metrics": metrics,
        }))
    }

    /// Drop every function record and named metric.
    pub fn clear_all(&self) -> Result<(), TelemetryError> {
        let mut state = self.lock()?;
        state.functions.clear();
        state.metrics.clear();
        debug!("cleared all metrics");
        Ok(())
    }

    /// Refresh the built-in gauges: uptime, tracked functions, executions.
    pub fn collect_default_metrics(&self) -> Result<(), TelemetryError> {
        let summary = self.summary()?;
        self.record_metric("stepwire_uptime_ms", MetricKind::Gauge, summary.uptime_ms as f64, [])?;
        self.record_metric("stepwire_registered_functions", MetricKind::Gauge, summary.total_functions as f64, [])?;
        self.record_metric("stepwire_executions_total", MetricKind::Gauge, summary.total_executions as f64, [])?;
        Ok(())
    }

    /// Spawn the periodic collection timer on the current tokio runtime.
    pub fn start_collection(&self, interval: Duration) -> BackgroundTask {
        let cancellation_token = CancellationToken::new();
        let shutdown = cancellation_token.child_token();
        let service = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = service.collect_default_metrics() {
                            warn!(error = %error, "metrics collection failed");
                        }
                    }
                }
            }
            debug!("metrics collection stopped");
        });
        BackgroundTask::new(cancellation_token, handle)
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

impl ExecutionRecorder for MonitoringService {
    fn register_function(&self, function_id: &str) -> Result<(), TelemetryError> {
        let mut state = self.lock()?;
        if !state.functions.contains_key(function_id) {
            state.functions.insert(function_id.to_string(), FunctionMetrics::new(function_id));
            debug!(function_id = %function_id, "function registered for monitoring");
        }
        Ok(())
    }

    fn record_execution(&self, record: ExecutionRecord) -> Result<(), TelemetryError> {
        let mut state = self.lock()?;
        state
            .functions
            .entry(record.function_id.clone())
            .or_insert_with(|| FunctionMetrics::new(&record.function_id))
            .record(&record);
        Ok(())
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}=\"{}\"", escape_label(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
