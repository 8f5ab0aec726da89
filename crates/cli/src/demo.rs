//! Sample functions served by `stepwire serve`.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use stepwire_registry::{InstanceContainer, MetadataRegistry, MethodTable};
use stepwire_server::ModuleHost;
use stepwire_types::{
    EventPayload, ExecutionContext, FunctionMiddleware, FunctionOptions, HandlerShape, MiddlewareHandle, ThrottlePolicy,
};

/// Greets new users and sends a nightly digest.
pub struct Onboarding {
    greeting: String,
}

/// Stamps each invocation with the id of the app that served it.
struct ServedBy {
    app_id: String,
}

#[async_trait]
impl FunctionMiddleware for ServedBy {
    fn name(&self) -> &str {
        "served-by"
    }

    async fn transform_input(&self, ctx: &mut ExecutionContext) -> Result<()> {
        ctx.set_extension("servedBy", json!(self.app_id))?;
        Ok(())
    }
}

fn methods() -> MethodTable {
    MethodTable::builder::<Onboarding>()
        .positional_method("welcome", |onboarding: Arc<Onboarding>, event: EventPayload, step, ctx| async move {
            let name = event.data["name"].as_str().unwrap_or("friend").to_string();
            let greeting = format!("{}, {name}!", onboarding.greeting);
            let message: String = step.run_as("compose-greeting", async move { Ok(greeting) }).await?;
            step.sleep("cool-off", Duration::from_millis(10)).await?;
            Ok::<_, anyhow::Error>(json!({ "message": message, "servedBy": ctx.extension("servedBy") }))
        })
        .context_method("digest", |_onboarding, input| async move {
            let count: u64 = input.step.run_as("count-signups", async { Ok(0u64) }).await?;
            Ok::<_, anyhow::Error>(json!({ "signups": count, "runId": input.ctx.run_id }))
        })
        .context_method("status", |_onboarding, _input| async move { Ok::<_, anyhow::Error>(Value::Null) })
        .build()
}

/// Instances and metadata for the demo module.
pub fn host(app_id: &str) -> Result<ModuleHost> {
    let registry = MetadataRegistry::new();
    registry.function::<Onboarding>("welcome", FunctionOptions::for_event("user/signed.up"), HandlerShape::Positional)?;
    registry.throttle::<Onboarding>(
        "welcome",
        ThrottlePolicy {
            limit: 10,
            period: "1m".to_string(),
            key: None,
            burst: None,
        },
    )?;
    registry.use_middleware::<Onboarding>("welcome", [MiddlewareHandle::new(ServedBy { app_id: app_id.to_string() })])?;

    registry.retries::<Onboarding>("digest", 1)?;
    registry.function::<Onboarding>(
        "digest",
        FunctionOptions::for_cron("0 9 * * *").with_id("nightly-digest"),
        HandlerShape::Context,
    )?;

    let mut container = InstanceContainer::new();
    container.add_provider(
        Arc::new(Onboarding {
            greeting: "Welcome aboard".to_string(),
        }),
        methods(),
    )?;
    Ok(ModuleHost::new(Arc::new(container), registry))
}
