use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neubridge::{Host, HostConfig, LifecycleEvent, WindowOptions};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "neubridge", about = "Run Neutralino windows from a host process")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (defaults to ./neubridge.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open one window and run until it closes
    Open(OpenArgs),
}

#[derive(clap::Args)]
struct OpenArgs {
    /// URL the window loads
    url: String,

    /// Logical window name
    #[arg(long)]
    name: Option<String>,

    /// Window option as key=value; the value is parsed as JSON when possible
    #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
    options: Vec<(String, Value)>,
}

fn parse_option(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("missing option name in `{raw}`"));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "neubridge=debug,info"
    } else {
        "neubridge=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = HostConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Open(args) => open_command(config, args).await,
    }
}

async fn open_command(config: HostConfig, args: OpenArgs) -> Result<()> {
    let host = Host::builder()
        .config(config)
        .start()
        .await
        .context("Failed to start host")?;

    let mut options: WindowOptions = args.options.into_iter().collect();
    if let Some(name) = args.name {
        options = options.name(name);
    }
    let name = options.logical_name().map(str::to_string);

    let mut lifecycle = host.subscribe();
    let result = run_window(&host, &args.url, options, name, &mut lifecycle).await;
    host.shutdown().await;
    result
}

async fn run_window(
    host: &Host,
    url: &str,
    options: WindowOptions,
    name: Option<String>,
    lifecycle: &mut tokio::sync::broadcast::Receiver<LifecycleEvent>,
) -> Result<()> {
    let id = tokio::select! {
        created = host.create(url, options) => created.context("Failed to open window")?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            return Ok(());
        }
    };
    let name = name.unwrap_or(id);
    info!(%name, "window ready");

    loop {
        tokio::select! {
            event = lifecycle.recv() => match event {
                Ok(LifecycleEvent::Closed { name: closed, exit_code }) if closed == name => {
                    info!(%name, ?exit_code, "window closed");
                    return Ok(());
                }
                Ok(event) => info!(name = %event.name(), "lifecycle: {:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("missed {} lifecycle events", skipped),
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        }
    }
}
