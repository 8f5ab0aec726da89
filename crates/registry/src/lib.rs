//! # Stepwire registry
//!
//! Explicit replacements for annotation metadata and host reflection.
//!
//! - [`MetadataRegistry`] stores per-method function metadata and middleware
//!   lists, written by registration calls at module initialization.
//! - [`MethodTable`] lists the callable methods of one type together with
//!   their calling convention.
//! - [`InstanceContainer`] holds the host's providers and controllers and
//!   their method tables, and is the [`InstanceDiscovery`] source the
//!   explorer scans.
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use stepwire_registry::{InstanceContainer, MetadataRegistry, MethodTable};
//! use stepwire_types::{FunctionOptions, HandlerShape};
//!
//! struct Billing;
//!
//! let registry = MetadataRegistry::new();
//! registry.retries::<Billing>("charge", 5).unwrap();
//! registry
//!     .function::<Billing>("charge", FunctionOptions::for_event("billing/charge"), HandlerShape::Context)
//!     .unwrap();
//!
//! let mut container = InstanceContainer::new();
//! container.add_provider(
//!     Arc::new(Billing),
//!     MethodTable::builder::<Billing>()
//!         .context_method("charge", |_billing, input| async move { Ok::<_, anyhow::Error>(json!({ "event": input.event.name })) })
//!         .build(),
//! )
//! .unwrap();
//!
//! let merged = registry.lookup::<Billing>("charge").unwrap().unwrap().merged();
//! assert_eq!(merged.retries, Some(5));
//! ```

mod container;
mod error;
mod metadata;
mod methods;

pub use container::{InstanceContainer, InstanceDiscovery, InstanceKind, InstanceWrapper};
pub use error::MetadataError;
pub use metadata::{FunctionMetadata, MetadataRegistry, MethodKey, PolicyOverrides};
pub use methods::{ContextMethod, Instance, MethodEntry, MethodTable, MethodTableBuilder, PositionalMethod, short_type_name};
