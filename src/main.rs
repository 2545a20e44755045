// src/main.rs

//! The thin binary entry point: loads configuration, sets up logging, and
//! runs the orchestrator until a shutdown signal is received.

use acarshub_core::config::Config;
use acarshub_core::core::sink::BroadcastSink;
use acarshub_core::core::Orchestrator;
use anyhow::Result;
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("acarshub-core version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config = match config_path {
        Some(path) => match Config::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to load configuration from \"{path}\": {e}");
                std::process::exit(1);
            }
        },
        None => match Config::from_env() {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to build configuration from the environment: {e}");
                std::process::exit(1);
            }
        },
    };

    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();
    let reload_handle = Arc::new(reload_handle);

    let sink = Arc::new(BroadcastSink::new());
    let orchestrator = match Orchestrator::initialize(&config, sink, Some(reload_handle)).await {
        Ok(o) => o,
        Err(e) => {
            error!("failed to initialize orchestrator: {e}");
            std::process::exit(1);
        }
    };

    orchestrator.start().await;
    info!("acarshub-core running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    orchestrator.stop().await;

    Ok(())
}
