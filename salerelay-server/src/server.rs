//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::wait_for_shutdown;
use crate::state::AppState;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Build the ingress router.
///
/// When `state.server.live_listen` is `None` the live endpoint is mounted
/// here as well, at `/live`.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        // Banner for browser checks
        .route("/", get(index))
        // Health check endpoint
        .route("/health", get(health_check))
        .merge(api::router());

    let router = if state.server.live_listen.is_none() {
        router.merge(api::live::router(false))
    } else {
        router
    };

    // Add state to all routes
    router.with_state(state)
}

/// Build the router for the dedicated live-update listener.
pub fn build_live_router(state: AppState) -> Router {
    api::live::router(true).with_state(state)
}

async fn index() -> &'static str {
    "Sale relay is running!"
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    subscribers: usize,
}

/// Simple health check - returns OK if the server is running.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        subscribers: state.registry.len().await,
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await
}
