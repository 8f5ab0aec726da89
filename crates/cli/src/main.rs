use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use stepwire_config::load_config;
use stepwire_engine::StepwireService;
use stepwire_server::{StepwireHttpServer, StepwireModule};
use stepwire_telemetry::TraceService;
use stepwire_types::EventPayload;
use tracing::{Level, info, warn};

mod demo;

#[derive(Debug, Parser)]
#[command(name = "stepwire", version, about = "Durable workflow functions for Rust services")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the merged, validated configuration with credentials redacted
    CheckConfig {
        /// Config file (JSON or YAML). Defaults to STEPWIRE_CONFIG_PATH or the user config dir
        #[arg(long, short)]
        file: Option<PathBuf>,
    },
    /// Send one event to the executor
    Send {
        /// Event name, e.g. `user/signed.up`
        name: String,
        /// Event data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
        #[arg(long, short)]
        file: Option<PathBuf>,
    },
    /// Parse a traceparent header and print its parts
    Traceparent { header: String },
    /// Serve the demo module until interrupted
    Serve {
        #[arg(long, short)]
        file: Option<PathBuf>,
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::CheckConfig { file } => check_config(file),
        Command::Send { name, data, file } => send(name, &data, file).await,
        Command::Traceparent { header } => traceparent(&header),
        Command::Serve { file, bind } => serve(file, bind).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .try_init();
}

fn check_config(file: Option<PathBuf>) -> Result<()> {
    let config = load_config(file.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

async fn send(name: String, data: &str, file: Option<PathBuf>) -> Result<()> {
    let data: Value = serde_json::from_str(data).context("--data must be valid JSON")?;
    let config = Arc::new(load_config(file.as_deref())?);
    let tracer = config
        .tracing_enabled()
        .then(|| TraceService::new(config.tracing.service_name.clone().unwrap_or_else(|| config.id.clone())));
    let service = StepwireService::new(config, tracer)?;

    let result = service.send(EventPayload::new(name, data)).await?;
    println!("{}", serde_json::to_string_pretty(&json!({ "ids": result.ids }))?);
    Ok(())
}

fn traceparent(header: &str) -> Result<()> {
    let context = TraceService::new("stepwire-cli").parse(header)?;
    let out = json!({
        "version": context.version,
        "traceId": context.trace_id,
        "spanId": context.span_id,
        "flags": context.flags,
        "sampled": context.is_sampled(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn serve(file: Option<PathBuf>, bind: SocketAddr) -> Result<()> {
    let config = load_config(file.as_deref())?;
    let host = demo::host(&config.id)?;
    let providers = StepwireModule::for_root_async(host, || async move { Ok::<_, anyhow::Error>(config) }).await?;

    let report = providers.init().await;
    for failure in &report.failed {
        warn!(instance = %failure.type_name, method = %failure.method, error = %failure.error, "demo function not registered");
    }

    let server = StepwireHttpServer::new(bind, providers).start().await?;
    info!(address = %server.bound_address(), "press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    server.stop().await?;
    Ok(())
}
