//! Host instance container.

use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use tracing::debug;

use crate::{
    error::MetadataError,
    methods::{Instance, MethodTable, short_type_name},
};

/// Role an instance plays in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Provider,
    Controller,
}

/// One managed instance with its type identity and method table.
#[derive(Clone)]
pub struct InstanceWrapper {
    pub instance: Instance,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub kind: InstanceKind,
    pub methods: Arc<MethodTable>,
}

impl InstanceWrapper {
    /// Type name without its module path, e.g. `OrderService`.
    pub fn name(&self) -> &str {
        short_type_name(self.type_name)
    }
}

impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Source of the instances a discovery pass scans.
pub trait InstanceDiscovery: Send + Sync {
    /// Providers first, then controllers.
    fn instances(&self) -> Result<Vec<InstanceWrapper>, MetadataError>;
}

/// The host's instance registry.
#[derive(Debug, Default, Clone)]
pub struct InstanceContainer {
    providers: Vec<InstanceWrapper>,
    controllers: Vec<InstanceWrapper>,
    tables: HashMap<TypeId, Arc<MethodTable>>,
}

impl InstanceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider instance together with its method table.
    ///
    /// The table must be built for `T`. Further instances of a type already
    /// in the container must bring a table with the same method set.
    pub fn add_provider<T: Any + Send + Sync>(&mut self, instance: Arc<T>, methods: MethodTable) -> Result<&mut Self, MetadataError> {
        let wrapper = self.wrap(instance, methods, InstanceKind::Provider)?;
        self.providers.push(wrapper);
        Ok(self)
    }

    /// Register a controller instance together with its method table.
    pub fn add_controller<T: Any + Send + Sync>(&mut self, instance: Arc<T>, methods: MethodTable) -> Result<&mut Self, MetadataError> {
        let wrapper = self.wrap(instance, methods, InstanceKind::Controller)?;
        self.controllers.push(wrapper);
        Ok(self)
    }

    pub fn providers(&self) -> &[InstanceWrapper] {
        &self.providers
    }

    pub fn controllers(&self) -> &[InstanceWrapper] {
        &self.controllers
    }

    /// Method table registered for a type, if any.
    pub fn method_table(&self, type_id: TypeId) -> Option<Arc<MethodTable>> {
        self.tables.get(&type_id).cloned()
    }

    /// First instance of type `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.providers
            .iter()
            .chain(&self.controllers)
            .find(|wrapper| wrapper.type_id == TypeId::of::<T>())
            .and_then(|wrapper| wrapper.instance.clone().downcast::<T>().ok())
    }

    fn wrap<T: Any + Send + Sync>(
        &mut self,
        instance: Arc<T>,
        methods: MethodTable,
        kind: InstanceKind,
    ) -> Result<InstanceWrapper, MetadataError> {
        let type_id = TypeId::of::<T>();
        if methods.type_id() != type_id {
            return Err(MetadataError::MethodTableMismatch {
                instance: type_name::<T>().to_string(),
                table: methods.type_name().to_string(),
            });
        }
        let methods = match self.tables.get(&type_id) {
            Some(existing) if existing.method_names().eq(methods.method_names()) => {
                debug!(instance = type_name::<T>(), "reusing method table for another instance");
                Arc::clone(existing)
            }
            Some(_) => {
                return Err(MetadataError::ConflictingMethodTable {
                    type_name: type_name::<T>().to_string(),
                });
            }
            None => {
                let methods = Arc::new(methods);
                self.tables.insert(type_id, Arc::clone(&methods));
                methods
            }
        };
        Ok(InstanceWrapper {
            instance,
            type_id,
            type_name: type_name::<T>(),
            kind,
            methods,
        })
    }
}

impl InstanceDiscovery for InstanceContainer {
    fn instances(&self) -> Result<Vec<InstanceWrapper>, MetadataError> {
        Ok(self.providers.iter().chain(&self.controllers).cloned().collect())
    }
}
