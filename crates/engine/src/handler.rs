//! Wraps a discovered method as an SDK handler.

use std::{sync::Arc, time::Instant};

use serde_json::Value;
use stepwire_registry::{Instance, MethodEntry};
use stepwire_sdk::{FunctionHandler, StepInterrupt, handler_fn};
use stepwire_telemetry::{ExecutionRecord, ExecutionRecorder};
use stepwire_types::{ExecutionContext, FunctionInput};
use tracing::{Instrument, debug, field, info, info_span, warn};

/// A method bound to its instance, plus what the wrapper reports to.
#[derive(Clone)]
pub struct MethodBinding {
    pub function_id: String,
    pub instance: Instance,
    pub entry: MethodEntry,
    pub recorder: Option<Arc<dyn ExecutionRecorder>>,
    /// Record the triggering event name on the invocation span.
    pub include_event_data: bool,
}

impl MethodBinding {
    /// Turn the binding into a handler the SDK can call.
    pub fn into_handler(self) -> FunctionHandler {
        let binding = Arc::new(self);
        handler_fn(move |ctx: ExecutionContext| {
            let binding = Arc::clone(&binding);
            async move { binding.invoke(ctx).await }
        })
    }

    async fn invoke(&self, ctx: ExecutionContext) -> anyhow::Result<Value> {
        let span = info_span!(
            "workflow_function",
            function_id = %self.function_id,
            run_id = %ctx.run_id,
            attempt = ctx.attempt,
            event = field::Empty,
        );
        if self.include_event_data {
            span.record("event", ctx.event.name.as_str());
        }

        let started = Instant::now();
        let handler_ctx = ctx.handler_context();
        let event = ctx.event;
        let step = ctx.step;
        let instance = Arc::clone(&self.instance);
        let result = match &self.entry {
            MethodEntry::Context(method) => {
                method(instance, FunctionInput { event, step, ctx: handler_ctx })
                    .instrument(span.clone())
                    .await
            }
            MethodEntry::Positional(method) => method(instance, event, step, handler_ctx).instrument(span.clone()).await,
        };
        let elapsed = started.elapsed();

        if let Err(err) = &result
            && StepInterrupt::is_interrupt(err)
        {
            span.in_scope(|| debug!(duration_ms = elapsed.as_millis() as u64, reason = %err, "function suspended"));
            return result;
        }

        if let Some(recorder) = &self.recorder {
            let record = match &result {
                Ok(_) => ExecutionRecord::success(&self.function_id, elapsed),
                Err(err) => ExecutionRecord::failure(&self.function_id, elapsed, err.to_string()),
            };
            if let Err(err) = recorder.record_execution(record) {
                warn!(function_id = %self.function_id, error = %err, "failed to record execution");
            }
        }

        span.in_scope(|| match &result {
            Ok(_) => info!(duration_ms = elapsed.as_millis() as u64, "function completed"),
            Err(err) => warn!(duration_ms = elapsed.as_millis() as u64, error = %err, "function failed"),
        });
        result
    }
}
