//! Liveness and readiness endpoints.
//!
//! Used by orchestration systems to probe the process. The forwarding core
//! never consults these; readiness means "the process is up and serving",
//! with no dependency checks behind it.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

/// Create the health routes.
pub fn routes() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readiness", get(readiness))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readiness() -> &'static str {
    "ready"
}

/// Serve the health endpoints on `0.0.0.0:<port>` until the process exits.
pub async fn serve(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind health server on {addr}"))?;

    info!(addr = %addr, "health server listening");

    axum::serve(listener, routes())
        .await
        .context("health server failed")
}
