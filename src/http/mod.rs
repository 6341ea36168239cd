//! HTTP transport for the MCP server.
//!
//! `POST /mcp` carries the same envelope as stdio and always answers 200;
//! failures live in the envelope. `/health`, `/info` and `/metrics` are
//! plain side endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::Result;
use crate::mcp::protocol::{error_codes, McpRequest, McpResponse, RpcError};
use crate::mcp::server::McpServer;

/// HTTP server state.
#[derive(Clone)]
pub struct HttpState {
    server: Arc<McpServer>,
}

/// Build the router without binding a socket.
pub fn router(server: Arc<McpServer>) -> Router {
    let state = HttpState { server };

    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn serve(server: Arc<McpServer>, addr: &str) -> Result<()> {
    let info = server.info().clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting MCP server: {} v{} on http://{}", info.name, info.version, addr);

    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("MCP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

async fn handle_mcp(State(state): State<HttpState>, body: Bytes) -> Json<McpResponse> {
    let response = match serde_json::from_slice::<McpRequest>(&body) {
        Ok(request) => state.server.handle(request).await,
        Err(e) => {
            error!("Failed to parse message: {}", e);
            McpResponse::failure(
                None,
                RpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {}", e)),
            )
        }
    };
    Json(response)
}

async fn health_check(State(state): State<HttpState>) -> impl IntoResponse {
    let server = &state.server;
    Json(json!({
        "status": "healthy",
        "server": server.info().name,
        "version": crate::VERSION,
        "tools": server.tools().tool_count(),
        "resources": server.resources().resource_count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn server_info(State(state): State<HttpState>) -> impl IntoResponse {
    let server = &state.server;
    Json(json!({
        "name": server.info().name,
        "version": server.info().version,
        "description": server.info().description,
        "tools": server.tools().names(),
        "resources": server.resources().uris(),
        "capabilities": server.capabilities(),
    }))
}

async fn metrics(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.server.metrics().to_prometheus(),
    )
}
