use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use flowsync::{
    config::AppConfig,
    observability::{init_observability, log_config_info},
    startup::ControlPlane,
    store::InMemoryResourceStore,
    APP_NAME, VERSION,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Translation and synchronization engine for an Envoy gateway control plane
#[derive(Debug, Parser)]
#[command(name = "flowsync", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON); FLOWSYNC__* variables override it
    #[arg(short, long, env = "FLOWSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// YAML list of resources to seed the in-memory store with
    #[arg(short, long, env = "FLOWSYNC_RESOURCES")]
    resources: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before any configuration is read from the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_observability(&config.observability).context("failed to initialize observability")?;

    info!(app_name = APP_NAME, version = VERSION, "Starting flowsync");
    log_config_info(&config);

    let store = match cli.resources.as_deref() {
        Some(path) => {
            let store = InMemoryResourceStore::from_yaml_file(path)
                .await
                .with_context(|| format!("failed to seed resources from {}", path.display()))?;
            info!(path = %path.display(), revision = store.revision(), "seeded resource store");
            store
        }
        None => {
            warn!("no resources file given, starting with an empty store");
            InMemoryResourceStore::new()
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received");
                    cancel.cancel();
                }
                Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
            }
        });
    }

    ControlPlane::new(config, Arc::new(store))
        .run(cancel)
        .await
        .context("control plane terminated with error")?;

    info!("Control plane shutdown completed");
    Ok(())
}
