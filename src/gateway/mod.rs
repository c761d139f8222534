//! Axum HTTP gateway: a streaming (SSE) and a synchronous entry point to the
//! pipeline, plus a health check.

mod handlers;
mod streaming;

use handlers::{handle_chat, handle_health};
use streaming::handle_chat_stream;

use crate::pipeline::Orchestrator;
use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// `POST /chat` body
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
}

/// `GET /chat-stream` query
#[derive(Debug, Deserialize)]
pub struct ChatStreamQuery {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody<'a> {
    pub(crate) error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) verdict: Option<&'a crate::guardrail::ScanVerdict>,
}

/// Routes, mounted under `root_path` when it is non-empty.
pub fn router(state: AppState, root_path: &str) -> Router {
    let routes = Router::new()
        .route("/chat-stream", get(handle_chat_stream))
        .route("/chat", post(handle_chat))
        .route("/healthcheck", get(handle_health))
        .with_state(state);

    let root = root_path.trim_end_matches('/');
    let app = if root.is_empty() {
        routes
    } else {
        Router::new().nest(root, routes)
    };

    app.layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
}

/// Bind `host:port` and serve until Ctrl-C.
pub async fn run_gateway(
    host: &str,
    port: u16,
    root_path: &str,
    orchestrator: Arc<Orchestrator>,
) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    run_gateway_with_listener(listener, root_path, orchestrator).await
}

/// Serve from a pre-bound listener.
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    root_path: &str,
    orchestrator: Arc<Orchestrator>,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    let prefix = root_path.trim_end_matches('/');

    tracing::info!("gateway listening on http://{local_addr}{prefix}");
    tracing::info!("  GET  {prefix}/chat-stream?message=...  → SSE");
    tracing::info!("  POST {prefix}/chat                     → JSON");
    tracing::info!("  GET  {prefix}/healthcheck");

    let app = router(AppState { orchestrator }, root_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Connect the tool agent ahead of the first request. Failure is logged and
/// the first request that needs the agent tries again.
pub async fn warm_agent(orchestrator: &Orchestrator) {
    let Some(cell) = orchestrator.aggregator().agent_cell() else {
        return;
    };
    match cell.get_or_init().await {
        Ok(_) => tracing::info!("tool agent ready"),
        Err(e) => tracing::warn!("agent warm-up failed, will retry on first use: {e}"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down gateway");
}
