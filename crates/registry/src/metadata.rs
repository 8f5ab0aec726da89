//! Per-method function metadata.
//!
//! Each annotated method owns one [`FunctionMetadata`] record. The primary
//! registration writes the base options and the handler shape; policy
//! registrations write only their own field into [`PolicyOverrides`]. Because
//! the two halves are stored apart and combined by [`FunctionMetadata::merged`]
//! at read time, the merged options do not depend on registration order.

use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use stepwire_types::{ConcurrencyPolicy, DebouncePolicy, FunctionOptions, HandlerShape, MiddlewareHandle, RateLimitPolicy, ThrottlePolicy};
use tracing::debug;

use crate::{error::MetadataError, methods::short_type_name};

/// Identity of one method on one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    type_id: TypeId,
    type_name: &'static str,
    method: String,
}

impl MethodKey {
    pub fn of<T: 'static>(method: impl Into<String>) -> Self {
        Self::new(TypeId::of::<T>(), type_name::<T>(), method)
    }

    pub fn new(type_id: TypeId, type_name: &'static str, method: impl Into<String>) -> Self {
        Self {
            type_id,
            type_name,
            method: method.into(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", short_type_name(self.type_name), self.method)
    }
}

/// Policy fields written by the policy registrations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOverrides {
    pub retries: Option<u32>,
    pub concurrency: Option<ConcurrencyPolicy>,
    pub rate_limit: Option<RateLimitPolicy>,
    pub throttle: Option<ThrottlePolicy>,
    pub debounce: Option<DebouncePolicy>,
}

/// Metadata accumulated for one method.
#[derive(Debug, Clone, Default)]
pub struct FunctionMetadata {
    /// Options from the primary registration. `None` until it runs.
    pub base: Option<FunctionOptions>,
    pub policies: PolicyOverrides,
    pub shape: Option<HandlerShape>,
}

impl FunctionMetadata {
    /// Whether the primary registration has been applied.
    pub fn is_function(&self) -> bool {
        self.base.is_some()
    }

    /// Base options overlaid with every policy field that was registered.
    pub fn merged(&self) -> FunctionOptions {
        let mut options = self.base.clone().unwrap_or_default();
        options.overlay(&self.policies.to_options());
        options
    }
}

impl PolicyOverrides {
    /// Options carrying only the policy fields.
    pub fn to_options(&self) -> FunctionOptions {
        FunctionOptions {
            retries: self.retries,
            concurrency: self.concurrency.clone(),
            rate_limit: self.rate_limit.clone(),
            throttle: self.throttle.clone(),
            debounce: self.debounce.clone(),
            ..Default::default()
        }
    }
}

/// Registry of function metadata and middleware, keyed by [`MethodKey`].
#[derive(Clone, Default)]
pub struct MetadataRegistry {
    records: Arc<Mutex<HashMap<MethodKey, FunctionMetadata>>>,
    middleware: Arc<Mutex<HashMap<MethodKey, Vec<MiddlewareHandle>>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `T::method` as a workflow function.
    ///
    /// Policy fields already registered for the method are preserved.
    /// Registering the same method twice is rejected.
    pub fn function<T: 'static>(&self, method: &str, options: FunctionOptions, shape: HandlerShape) -> Result<(), MetadataError> {
        let key = Self::key::<T>(method)?;
        self.update(key, |key, record| {
            if record.is_function() {
                return Err(MetadataError::duplicate_function(key.type_name(), key.method()));
            }
            record.base = Some(options);
            record.shape = Some(shape);
            Ok(())
        })
    }

    pub fn retries<T: 'static>(&self, method: &str, retries: u32) -> Result<(), MetadataError> {
        self.update(Self::key::<T>(method)?, |_, record| {
            record.policies.retries = Some(retries);
            Ok(())
        })
    }

    pub fn concurrency<T: 'static>(&self, method: &str, policy: ConcurrencyPolicy) -> Result<(), MetadataError> {
        self.update(Self::key::<T>(method)?, |_, record| {
            record.policies.concurrency = Some(policy);
            Ok(())
        })
    }

    pub fn rate_limit<T: 'static>(&self, method: &str, policy: RateLimitPolicy) -> Result<(), MetadataError> {
        self.update(Self::key::<T>(method)?, |_, record| {
            record.policies.rate_limit = Some(policy);
            Ok(())
        })
    }

    pub fn throttle<T: 'static>(&self, method: &str, policy: ThrottlePolicy) -> Result<(), MetadataError> {
        self.update(Self::key::<T>(method)?, |_, record| {
            record.policies.throttle = Some(policy);
            Ok(())
        })
    }

    pub fn debounce<T: 'static>(&self, method: &str, policy: DebouncePolicy) -> Result<(), MetadataError> {
        self.update(Self::key::<T>(method)?, |_, record| {
            record.policies.debounce = Some(policy);
            Ok(())
        })
    }

    /// Append middleware to the method's list. Repeated calls accumulate.
    pub fn use_middleware<T: 'static>(&self, method: &str, middleware: impl IntoIterator<Item = MiddlewareHandle>) -> Result<(), MetadataError> {
        let key = Self::key::<T>(method)?;
        let mut lists = self.middleware.lock().map_err(|error| MetadataError::Lock(error.to_string()))?;
        let list = lists.entry(key).or_default();
        list.extend(middleware);
        debug!(count = list.len(), "middleware list updated");
        Ok(())
    }

    /// Metadata recorded for `T::method`, if any.
    pub fn lookup<T: 'static>(&self, method: &str) -> Result<Option<FunctionMetadata>, MetadataError> {
        self.get(&MethodKey::of::<T>(method))
    }

    /// Metadata recorded for `key`, if any.
    pub fn get(&self, key: &MethodKey) -> Result<Option<FunctionMetadata>, MetadataError> {
        let records = self.records.lock().map_err(|error| MetadataError::Lock(error.to_string()))?;
        Ok(records.get(key).cloned())
    }

    /// Middleware registered for `key`, in registration order. Empty if none.
    pub fn middleware_for(&self, key: &MethodKey) -> Result<Vec<MiddlewareHandle>, MetadataError> {
        let lists = self.middleware.lock().map_err(|error| MetadataError::Lock(error.to_string()))?;
        Ok(lists.get(key).cloned().unwrap_or_default())
    }

    /// Number of methods marked as workflow functions.
    pub fn function_count(&self) -> Result<usize, MetadataError> {
        let records = self.records.lock().map_err(|error| MetadataError::Lock(error.to_string()))?;
        Ok(records.values().filter(|record| record.is_function()).count())
    }

    fn key<T: 'static>(method: &str) -> Result<MethodKey, MetadataError> {
        if method.trim().is_empty() {
            return Err(MetadataError::EmptyMethodName {
                type_name: type_name::<T>().to_string(),
            });
        }
        Ok(MethodKey::of::<T>(method))
    }

    fn update<F>(&self, key: MethodKey, apply: F) -> Result<(), MetadataError>
    where
        F: FnOnce(&MethodKey, &mut FunctionMetadata) -> Result<(), MetadataError>,
    {
        let mut records = self.records.lock().map_err(|error| MetadataError::Lock(error.to_string()))?;
        let record = records.entry(key.clone()).or_default();
        apply(&key, record)?;
        debug!(method = %key, "function metadata updated");
        Ok(())
    }
}

impl fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records = self.records.lock().map(|records| records.len()).unwrap_or_default();
        f.debug_struct("MetadataRegistry").field("records", &records).finish()
    }
}
