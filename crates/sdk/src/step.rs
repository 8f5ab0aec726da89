//! Inline step tools.
//!
//! `InlineStep` executes step work in-process. Results the executor already
//! memoized (sent in the invocation request) are returned without running
//! the work again; newly executed steps are recorded as [`StepOp`]s and
//! reported back in the serve response.
//!
//! Sleeps are owned by the executor: a sleep that has not completed yet
//! records its op and ends the invocation with a [`StepInterrupt`]. The
//! executor re-invokes the function once the delay has passed, with the
//! sleep's id present in the memoized steps.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value, json};
use stepwire_types::{EventPayload, SendEventsResult, SendPayload, StepTools, WaitForEventOptions};
use thiserror::Error;
use tracing::debug;

use crate::client::WorkflowClient;

/// Kind of step operation performed during an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepOpKind {
    Run,
    Sleep,
    WaitForEvent,
    SendEvent,
}

/// A step executed during this invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOp {
    pub id: String,
    pub op: StepOpKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Ends an invocation early so the executor can schedule the step.
///
/// Handlers propagate it with `?` like any other error; the serve handler
/// answers with the recorded ops instead of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step '{step_id}' is scheduled by the executor")]
pub struct StepInterrupt {
    pub step_id: String,
    pub op: StepOpKind,
}

impl StepInterrupt {
    /// Whether `error` is an interrupt rather than a handler failure.
    pub fn is_interrupt(error: &anyhow::Error) -> bool {
        error.is::<StepInterrupt>()
    }
}

/// Step tools backed by the memoized state of one invocation.
pub struct InlineStep {
    memo: Mutex<HashMap<String, Value>>,
    ops: Mutex<Vec<StepOp>>,
    client: Option<WorkflowClient>,
}

impl InlineStep {
    /// Create step tools seeded with previously memoized step results.
    pub fn new(memoized: Map<String, Value>, client: Option<WorkflowClient>) -> Self {
        Self {
            memo: Mutex::new(memoized.into_iter().collect()),
            ops: Mutex::new(Vec::new()),
            client,
        }
    }

    /// Operations executed (not replayed) during this invocation.
    pub fn ops(&self) -> Vec<StepOp> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    fn memoized(&self, id: &str) -> anyhow::Result<Option<Value>> {
        let memo = self.memo.lock().map_err(|_| anyhow!("step state lock poisoned"))?;
        Ok(memo.get(id).cloned())
    }

    fn record(&self, id: &str, op: StepOpKind, data: Option<Value>, memo_value: Value) -> anyhow::Result<()> {
        {
            let mut memo = self.memo.lock().map_err(|_| anyhow!("step state lock poisoned"))?;
            memo.insert(id.to_string(), memo_value);
        }
        self.push_op(id, op, data)
    }

    fn push_op(&self, id: &str, op: StepOpKind, data: Option<Value>) -> anyhow::Result<()> {
        let mut ops = self.ops.lock().map_err(|_| anyhow!("step ops lock poisoned"))?;
        ops.push(StepOp {
            id: id.to_string(),
            op,
            data,
        });
        Ok(())
    }
}

#[async_trait]
impl StepTools for InlineStep {
    async fn run(&self, id: &str, work: BoxFuture<'static, anyhow::Result<Value>>) -> anyhow::Result<Value> {
        if let Some(value) = self.memoized(id)? {
            debug!(step_id = %id, "replaying memoized step");
            return Ok(value);
        }
        let value = work.await?;
        self.record(id, StepOpKind::Run, Some(value.clone()), value.clone())?;
        Ok(value)
    }

    async fn sleep(&self, id: &str, duration: Duration) -> anyhow::Result<()> {
        if self.memoized(id)?.is_some() {
            return Ok(());
        }
        if duration.is_zero() {
            return self.record(id, StepOpKind::Sleep, Some(json!({ "ms": 0 })), Value::Null);
        }
        let until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay));
        self.push_op(
            id,
            StepOpKind::Sleep,
            Some(json!({ "ms": duration.as_millis() as u64, "until": until })),
        )?;
        debug!(step_id = %id, ms = duration.as_millis() as u64, "sleep handed to the executor");
        Err(StepInterrupt {
            step_id: id.to_string(),
            op: StepOpKind::Sleep,
        }
        .into())
    }

    async fn sleep_until(&self, id: &str, until: DateTime<Utc>) -> anyhow::Result<()> {
        let remaining = (until - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.sleep(id, remaining).await
    }

    async fn wait_for_event(&self, id: &str, options: WaitForEventOptions) -> anyhow::Result<Option<EventPayload>> {
        if let Some(value) = self.memoized(id)? {
            if value.is_null() {
                return Ok(None);
            }
            let event = serde_json::from_value(value).with_context(|| format!("memoized event for step '{id}' is malformed"))?;
            return Ok(Some(event));
        }
        self.record(id, StepOpKind::WaitForEvent, Some(serde_json::to_value(&options)?), Value::Null)?;
        Ok(None)
    }

    async fn send_event(&self, id: &str, payload: SendPayload) -> anyhow::Result<SendEventsResult> {
        if let Some(value) = self.memoized(id)? {
            return Ok(serde_json::from_value(value)?);
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow!("step '{id}' cannot send events without a client"))?;
        let result = client.send(payload).await?;
        let value = serde_json::to_value(&result)?;
        self.record(id, StepOpKind::SendEvent, Some(value.clone()), value)?;
        Ok(result)
    }
}
