use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use calcrawl_db::{Database, DatabaseConfig};
use calcrawl_server::state::AppState;
use calcrawl_server::{DEFAULT_SERVER_ADDR, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("calcrawl=info".parse()?))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let addr =
        std::env::var("CALCRAWL_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string());

    let db = Database::connect(&DatabaseConfig::from_env()?)
        .await
        .context("Failed to open event store")?;
    db.migrate().await?;

    let state = Arc::new(AppState { db });
    serve(&addr, state, shutdown_signal())
        .await
        .with_context(|| format!("Server on {addr} failed"))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
