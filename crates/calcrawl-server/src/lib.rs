//! Read-only REST API: routes, DTOs, and OpenAPI documentation.

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8989";

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Starting server on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
