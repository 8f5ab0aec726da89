//! Shared type definitions for Stepwire.
//!
//! These types sit between the host-facing registry, the workflow SDK surface
//! and the discovery engine: function options and policies, triggers, event
//! payloads and the execution context handed to workflow handlers.

pub mod context;
pub mod event;
pub mod options;

pub use context::{
    ContextError, ExecutionContext, FunctionInput, FunctionMiddleware, HandlerContext, HandlerShape, MiddlewareHandle,
    STANDARD_CONTEXT_KEYS, StepHandle, StepTools, WaitForEventOptions,
};
pub use event::{EventPayload, SendEventsResult, SendPayload};
pub use options::{
    BatchEventsPolicy, CancelOn, ConcurrencyPolicy, ConcurrencyScope, DebouncePolicy, FunctionOptions, PriorityPolicy, RateLimitPolicy,
    ThrottlePolicy, Timeouts, Trigger,
};
