// crates/server/src/main.rs
//! co11y server binary.
//!
//! Starts the broadcast hub (aggregation loop plus file watcher), then serves
//! the HTTP API until Ctrl-C, at which point the hub is shut down so every
//! open event stream ends.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use co11y_server::{create_app_with_cors, init_metrics, AppState, BroadcastHub, ServerConfig};

const DEFAULT_LOG_FILTER: &str = "warn,co11y_server=info,co11y_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    let config = ServerConfig::parse();
    tracing::debug!(?config, "Loaded configuration");

    init_metrics();

    let projects_dir = config
        .resolve_projects_dir()
        .context("failed to resolve projects directory")?;
    let cors = config
        .cors_layer()
        .context("invalid --allowed-origin value")?;

    let hub = BroadcastHub::new(projects_dir.clone(), config.hub_config());
    hub.start();

    let app = create_app_with_cors(AppState::new(hub.clone()), cors);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        projects_dir = %projects_dir.display(),
        "co11y v{} listening",
        env!("CARGO_PKG_VERSION")
    );

    let shutdown_hub = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
            shutdown_hub.shutdown();
        })
        .await?;

    hub.shutdown();
    Ok(())
}
