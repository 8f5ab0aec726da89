//! # Stepwire Engine
//!
//! Turns explicitly registered method metadata into live workflow functions.
//!
//! - [`StepwireService`] owns the SDK client and the list of registered
//!   functions, resolves triggers and injects trace context into outgoing
//!   events.
//! - [`FunctionExplorer`] scans the host's instances at module init, merges
//!   each method's metadata, wraps the method with timing, metrics and
//!   logging, and registers it with the service.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use stepwire_config::{Environment, StepwireConfig, merge_with_defaults};
//! use stepwire_engine::{FunctionExplorer, StepwireService};
//! use stepwire_registry::{InstanceContainer, MetadataRegistry, MethodTable};
//! use stepwire_types::{FunctionOptions, HandlerShape};
//!
//! struct Orders;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let registry = MetadataRegistry::new();
//! registry.function::<Orders>("process", FunctionOptions::for_event("order/created"), HandlerShape::Context)?;
//!
//! let mut container = InstanceContainer::new();
//! container.add_provider(
//!     Arc::new(Orders),
//!     MethodTable::builder::<Orders>()
//!         .context_method("process", |_orders, input| async move { Ok::<_, anyhow::Error>(json!({ "event": input.event.name })) })
//!         .build(),
//! )?;
//!
//! let config = Arc::new(merge_with_defaults(StepwireConfig::new("shop", Environment::Development)));
//! let service = StepwireService::new(config, None)?;
//! let report = FunctionExplorer::new(Arc::new(container), registry, service.clone()).on_module_init().await;
//! assert_eq!(report.registered, vec!["Orders.process".to_string()]);
//! # Ok(())
//! # }
//! ```

mod error;
mod explorer;
mod handler;
mod service;

pub use error::{ExplorerError, ServiceError};
pub use explorer::{DiscoveryFailure, DiscoveryReport, FunctionExplorer};
pub use handler::MethodBinding;
pub use service::StepwireService;
