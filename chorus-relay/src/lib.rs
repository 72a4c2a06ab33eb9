pub mod config;
pub mod relay_service;
pub mod ws_handler;

pub use config::RelayConfig;
pub use relay_service::*;
pub use ws_handler::ws_handler;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(service: RelayService) -> Router {
    Router::new()
        .route("/ws/{session}/{participant}", get(ws_handler))
        .with_state(service)
}

/// Serves the relay on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, service: RelayService) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Signaling relay listening on ws://{}", addr);
    axum::serve(listener, router(service))
        .await
        .context("relay server stopped")
}

pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    serve(listener, RelayService::new()).await
}
