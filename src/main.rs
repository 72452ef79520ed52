//! Runestone Builder · Assignment Authoring Backend
//!
//! - Axum HTTP + WebSocket API
//! - In-memory collaborators, or a remote Runestone server (via environment variables)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   BUILDER_CONFIG_PATH    : path to TOML config (course + data-file and readings banks)
//!   RUNESTONE_BASE_URL     : switches collaborators to the remote server if present
//!   RUNESTONE_API_TOKEN    : bearer token for the remote server
//!   RUNESTONE_TIMEOUT_SECS : remote request timeout (default 20)
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use runestone_builder::routes::build_router;
use runestone_builder::state::AppState;
use runestone_builder::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared collaborators (memory backend or remote client).
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "runestone_builder", %addr, backend = state.backend, course = %state.course, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "runestone_builder", error = %e, "Could not listen for shutdown signal");
  }
  info!(target: "runestone_builder", "Shutting down");
}
