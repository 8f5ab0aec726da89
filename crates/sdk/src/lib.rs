//! Workflow SDK surface used by Stepwire.
//!
//! This crate is the thin client side of a durable-workflow executor:
//!
//! - [`WorkflowClient`] sends events and syncs function manifests over HTTP
//! - [`WorkflowFunction`] pairs validated options and a trigger with a handler
//! - [`InlineStep`] provides step tools seeded with memoized step results
//! - [`ServeHandler`] answers the executor's GET/PUT/POST calls
//!
//! Durable execution itself (scheduling, retries, memoization across
//! invocations) is performed by the executor that calls the serve endpoint.

pub mod client;
pub mod error;
pub mod function;
pub mod serve;
pub mod step;

pub use client::{ClientMode, ClientOptions, RegistrationRequest, WorkflowClient};
pub use error::SdkError;
pub use function::{DEFAULT_RETRIES, FunctionHandler, FunctionManifest, MAX_RETRIES, WorkflowFunction, handler_fn};
pub use serve::{ServeHandler, ServeMethod, ServeOptions, ServeRequest, ServeResponse};
pub use step::{InlineStep, StepInterrupt, StepOp, StepOpKind};

/// SDK identifier reported during registration.
pub const SDK_NAME: &str = "stepwire-rs";
/// SDK version reported during registration.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
