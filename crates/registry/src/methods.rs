//! Method tables: the callable surface of a host type.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    sync::Arc,
};

use anyhow::anyhow;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use stepwire_types::{EventPayload, FunctionInput, HandlerContext, HandlerShape, StepHandle};

/// Type-erased instance held by the container.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Method taking one aggregate [`FunctionInput`].
pub type ContextMethod = Arc<dyn Fn(Instance, FunctionInput) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Method taking `(event, step, ctx)`.
pub type PositionalMethod =
    Arc<dyn Fn(Instance, EventPayload, StepHandle, HandlerContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// One callable method and its calling convention.
#[derive(Clone)]
pub enum MethodEntry {
    Context(ContextMethod),
    Positional(PositionalMethod),
}

impl MethodEntry {
    pub fn shape(&self) -> HandlerShape {
        match self {
            MethodEntry::Context(_) => HandlerShape::Context,
            MethodEntry::Positional(_) => HandlerShape::Positional,
        }
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodEntry({})", self.shape())
    }
}

/// Callable methods of one type, in declaration order.
#[derive(Clone)]
pub struct MethodTable {
    type_id: TypeId,
    type_name: &'static str,
    methods: IndexMap<String, MethodEntry>,
}

impl MethodTable {
    pub fn builder<T: Any + Send + Sync>() -> MethodTableBuilder<T> {
        MethodTableBuilder {
            table: MethodTable {
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                methods: IndexMap::new(),
            },
            _marker: std::marker::PhantomData,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Method names, in declaration order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.get(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("type_name", &self.type_name)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Typed builder for a [`MethodTable`].
///
/// Closures receive the concrete `Arc<T>`; the downcast from the erased
/// instance happens inside the stored entry.
pub struct MethodTableBuilder<T> {
    table: MethodTable,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> MethodTableBuilder<T> {
    /// Register a method called with one [`FunctionInput`].
    pub fn context_method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Arc<T>, FunctionInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let entry: ContextMethod = Arc::new(
            move |instance: Instance, input: FunctionInput| -> BoxFuture<'static, anyhow::Result<Value>> {
                match downcast::<T>(instance) {
                    Ok(receiver) => Box::pin(method(receiver, input)),
                    Err(err) => Box::pin(async move { Err::<Value, anyhow::Error>(err) }),
                }
            },
        );
        self.table.methods.insert(name.into(), MethodEntry::Context(entry));
        self
    }

    /// Register a method called with `(event, step, ctx)`.
    pub fn positional_method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Arc<T>, EventPayload, StepHandle, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let entry: PositionalMethod = Arc::new(
            move |instance: Instance, event: EventPayload, step: StepHandle, ctx: HandlerContext| -> BoxFuture<'static, anyhow::Result<Value>> {
                match downcast::<T>(instance) {
                    Ok(receiver) => Box::pin(method(receiver, event, step, ctx)),
                    Err(err) => Box::pin(async move { Err::<Value, anyhow::Error>(err) }),
                }
            },
        );
        self.table.methods.insert(name.into(), MethodEntry::Positional(entry));
        self
    }

    pub fn build(self) -> MethodTable {
        self.table
    }
}

fn downcast<T: Any + Send + Sync>(instance: Instance) -> anyhow::Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| anyhow!("instance is not a {}", type_name::<T>()))
}

/// Last path segment of a Rust type name, without generic arguments.
///
/// `my_app::billing::InvoiceService<u8>` becomes `InvoiceService`.
pub fn short_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Greeter {
        greeting: &'static str,
    }

    struct Stranger;

    fn table() -> MethodTable {
        MethodTable::builder::<Greeter>()
            .positional_method("greet", |greeter: Arc<Greeter>, event: EventPayload, _step, _ctx| async move {
                Ok::<_, anyhow::Error>(json!(format!("{} {}", greeter.greeting, event.data["name"].as_str().unwrap_or("?"))))
            })
            .context_method("describe", |greeter: Arc<Greeter>, _input| async move {
                Ok::<_, anyhow::Error>(json!({ "greeting": greeter.greeting }))
            })
            .build()
    }

    #[test]
    fn methods_keep_declaration_order_and_shape() {
        let table = table();
        assert_eq!(table.method_names().collect::<Vec<_>>(), vec!["greet", "describe"]);
        assert_eq!(table.method("greet").map(MethodEntry::shape), Some(HandlerShape::Positional));
        assert_eq!(table.method("describe").map(MethodEntry::shape), Some(HandlerShape::Context));
        assert_eq!(short_type_name(table.type_name()), "Greeter");
    }

    #[tokio::test]
    async fn positional_entry_binds_the_instance() {
        let table = table();
        let Some(MethodEntry::Positional(greet)) = table.method("greet").cloned() else {
            panic!("greet should be positional");
        };
        let instance: Instance = Arc::new(Greeter { greeting: "hello" });
        let step: StepHandle = Arc::new(NoopStep);
        let output = greet(instance, EventPayload::new("user/signed.up", json!({ "name": "Ada" })), step, HandlerContext::default())
            .await
            .unwrap();
        assert_eq!(output, json!("hello Ada"));
    }

    #[tokio::test]
    async fn wrong_instance_type_is_an_error() {
        let table = table();
        let Some(MethodEntry::Positional(greet)) = table.method("greet").cloned() else {
            panic!("greet should be positional");
        };
        let instance: Instance = Arc::new(Stranger);
        let step: StepHandle = Arc::new(NoopStep);
        let err = greet(instance, EventPayload::new("e", json!({})), step, HandlerContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Greeter"));
    }

    #[test]
    fn short_type_name_strips_paths_and_generics() {
        assert_eq!(short_type_name("app::billing::InvoiceService"), "InvoiceService");
        assert_eq!(short_type_name("app::Cache<alloc::string::String>"), "Cache");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    struct NoopStep;

    #[async_trait::async_trait]
    impl stepwire_types::StepTools for NoopStep {
        async fn run(&self, _id: &str, work: BoxFuture<'static, anyhow::Result<Value>>) -> anyhow::Result<Value> {
            work.await
        }

        async fn sleep(&self, _id: &str, _duration: std::time::Duration) -> anyhow::Result<()> {
            Ok(())
        }

        async fn sleep_until(&self, _id: &str, _until: chrono::DateTime<chrono::Utc>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn wait_for_event(
            &self,
            _id: &str,
            _options: stepwire_types::WaitForEventOptions,
        ) -> anyhow::Result<Option<EventPayload>> {
            Ok(None)
        }

        async fn send_event(&self, _id: &str, _payload: stepwire_types::SendPayload) -> anyhow::Result<stepwire_types::SendEventsResult> {
            Ok(Default::default())
        }
    }
}
