//! Stepwire module construction and HTTP surface.
//!
//! [`StepwireModule`] builds the configuration, registration service,
//! explorer and enabled telemetry services in one of three ways. The
//! resulting [`ModuleProviders`] run discovery through their on-init hook
//! and can be served with [`StepwireHttpServer`] or mounted through
//! [`router`].

mod error;
mod http;
mod module;

pub use error::ModuleError;
pub use http::{RunningStepwireServer, StepwireHttpServer, router};
pub use module::{ModuleHost, ModuleProviders, OptionsFactory, StepwireModule};
