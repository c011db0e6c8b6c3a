//! HTTP request handlers

use super::types::{ChatRequest, ChatResponse, ErrorResponse, VersionResponse};
use super::AppState;
use crate::history::Turn;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router. `max_body_bytes` bounds `/chat` payloads, which
/// carry images inline as data URIs.
pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/history", get(get_history))
        .route("/chat", post(send_chat))
        .route("/version", get(get_version))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

// ============================================================
// History
// ============================================================

/// Last saved history, read back from the store rather than memory.
/// Never waits on the session lock.
async fn get_history(State(state): State<AppState>) -> Result<Json<Vec<Turn>>, AppError> {
    let turns = state.store.load().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to read history");
        AppError::Internal(e.to_string())
    })?;
    Ok(Json(turns))
}

// ============================================================
// Chat
// ============================================================

/// Always answers 200; failures come back as the reply text
async fn send_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let reply = match state
        .session
        .submit(&req.message, req.image.as_deref())
        .await
    {
        Ok(reply) => reply,
        Err(e) => e.to_string(),
    };
    Json(ChatResponse { reply })
}

// ============================================================
// Version
// ============================================================

async fn get_version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        model: state.session.model().to_string(),
    })
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
