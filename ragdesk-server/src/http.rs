//! ragdesk HTTP API
//!
//! Axum-based HTTP server for question answering and vector index sync.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum dispatch
//! machinery.
//!
//! Endpoints:
//! - POST /ask              — answer a question from the best-matching chunk
//! - POST /admin/sync_chunk — apply a chunk add/update/delete to the vector index
//! - GET  /health           — collection and model status
//! - GET  /version          — server version info
//!
//! Errors are `{"detail": "..."}`: 400 for malformed or invalid requests,
//! 500 for downstream failures.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use ragdesk_core::embeddings::EmbeddingBackend;
use ragdesk_core::generator::ChatBackend;
use ragdesk_core::models::sync::SyncChunkRequest;
use ragdesk_core::vector_store::VectorStore;
use ragdesk_core::RagdeskConfig;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::subsystems::{answer, sync};

/// Shared state for all HTTP handlers.
///
/// Model handles are created once at startup and shared for the process lifetime.
#[derive(Clone)]
pub struct HttpState {
    pub config: RagdeskConfig,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub chat: Arc<dyn ChatBackend>,
    pub store: Arc<VectorStore>,
}

impl HttpState {
    pub fn collection(&self) -> &str {
        &self.config.vector_store.collection
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/ask", post(ask_handler))
        .route("/admin/sync_chunk", post(sync_chunk_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(state: Arc<HttpState>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("ragdesk HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

fn detail(status: StatusCode, message: impl std::fmt::Display) -> (StatusCode, serde_json::Value) {
    (status, serde_json::json!({ "detail": message.to_string() }))
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner ask — retrieve the top chunk and generate an answer.
pub async fn ask_inner(state: &HttpState, req: AskRequest) -> (StatusCode, serde_json::Value) {
    let start = Instant::now();
    let result = answer::answer_question(
        &req.question,
        state.embedder.as_ref(),
        state.chat.as_ref(),
        &state.store,
        state.collection(),
    )
    .await;

    match result {
        Ok((answer, _context)) => {
            tracing::info!(took_ms = start.elapsed().as_millis() as u64, "ask handled");
            (StatusCode::OK, serde_json::json!(AskResponse { answer }))
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "ask failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

/// Inner sync — validate the request, then embed/upsert or delete.
pub async fn sync_chunk_inner(state: &HttpState, req: SyncChunkRequest) -> (StatusCode, serde_json::Value) {
    let command = match req.validate() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected sync request");
            return detail(StatusCode::BAD_REQUEST, e);
        }
    };

    match sync::apply_sync_command(command, state.embedder.as_ref(), &state.store, state.collection()).await {
        Ok(response) => (StatusCode::OK, serde_json::json!(response)),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "sync_chunk failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

/// Inner health check — reports collection status and model names.
pub fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    match state.store.info(state.collection()) {
        Ok(info) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "collection": info.name,
                "points": info.points,
                "vector_size": info.vector_size,
                "embedder": state.embedder.name(),
                "generator": state.chat.name(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "detail": e.to_string(),
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

/// Malformed or mistyped JSON bodies are client errors.
pub fn rejection_inner(rejection: JsonRejection) -> (StatusCode, serde_json::Value) {
    tracing::warn!(error = %rejection.body_text(), "Rejected request body");
    detail(StatusCode::BAD_REQUEST, rejection.body_text())
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn ask_handler(
    State(state): State<Arc<HttpState>>,
    payload: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => ask_inner(&state, req).await,
        Err(rejection) => rejection_inner(rejection),
    };
    (status, Json(body))
}

pub async fn sync_chunk_handler(
    State(state): State<Arc<HttpState>>,
    payload: std::result::Result<Json<SyncChunkRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => sync_chunk_inner(&state, req).await,
        Err(rejection) => rejection_inner(rejection),
    };
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests — pure inner functions
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["name"], "ragdesk-server");
    }

    #[test]
    fn test_detail_shape() {
        let (status, body) = detail(StatusCode::BAD_REQUEST, "Invalid action: 'bogus'");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "detail": "Invalid action: 'bogus'" }));
    }
}
