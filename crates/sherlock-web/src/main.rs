//! sherlock-web binary
//!
//! Serves the form and runs the sherlock image through the local Docker daemon.

use anyhow::{Context, Result};
use clap::Parser;
use sherlock_engine::{ContainerEngine, DockerEngine};
use sherlock_web::{shutdown_signal, RunSettings, ServerConfig, SherlockServer, DEFAULT_IMAGE};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments for sherlock-web.
#[derive(Parser, Debug)]
#[command(name = "sherlock-web")]
#[command(about = "Web form that runs sherlock in a container")]
#[command(version)]
struct Args {
    /// Container image to run
    #[arg(long, env = "SHERLOCK_IMAGE", default_value = DEFAULT_IMAGE)]
    image: String,

    /// Host directory mounted at /data in every container
    #[arg(long, env = "SHERLOCK_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Server bind address
    #[arg(short, long, env = "SHERLOCK_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Per-run deadline in seconds; unset waits for the container indefinitely
    #[arg(long, env = "SHERLOCK_RUN_TIMEOUT")]
    run_timeout: Option<u64>,

    /// Pull the image when Docker reports it missing
    #[arg(long, env = "SHERLOCK_PULL_MISSING", default_value = "true", action = clap::ArgAction::Set)]
    pull_missing: bool,

    /// Maximum request body size in bytes
    #[arg(long, default_value = "16384")]
    max_body_size: usize,

    /// Enable request logging
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    logging: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let config = ServerConfig::new()
        .with_bind_addr_str(&args.bind)?
        .with_max_body_size(args.max_body_size)
        .with_logging(args.logging);

    let settings = RunSettings::prepare(args.image.clone(), &args.data_dir)
        .await
        .with_context(|| format!("Failed to prepare data directory {}", args.data_dir.display()))?;

    let engine = DockerEngine::connect()
        .context("Failed to set up Docker client")?
        .with_run_timeout(args.run_timeout())
        .with_pull_missing(args.pull_missing);

    if args.run_timeout().is_none() {
        log::warn!("No run timeout configured; a hung container blocks its request indefinitely");
    }

    log::info!("Starting sherlock-web...");
    log::info!("Configuration:");
    log::info!("  Bind address: {}", config.bind_addr);
    log::info!("  Image: {}", settings.image);
    log::info!("  Data directory: {}", settings.data_dir.display());
    log::info!("  Engine: {}", engine.describe());
    log::info!("  Pull missing image: {}", args.pull_missing);
    log::info!("  Max body size: {} bytes", config.max_body_size);

    let server = SherlockServer::with_config(Arc::new(engine), settings, config);

    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
