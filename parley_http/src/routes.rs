use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use parley_core::ChatMessage;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::service::{ApiError, AppState};

/// Liveness/info endpoint path.
pub const INFO_PATH: &str = "/";
/// Core turn endpoint path.
pub const CHAT_PATH: &str = "/chat";
/// Thread history endpoint path.
pub const THREAD_HISTORY_PATH: &str = "/threads/{thread_id}/history";

#[derive(Debug, Serialize)]
struct InfoResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    message: String,
    thread_id: String,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    messages: Vec<ChatMessage>,
}

/// Build the service routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(INFO_PATH, get(info_handler))
        .route(CHAT_PATH, post(chat))
        .route(THREAD_HISTORY_PATH, get(thread_history))
}

/// Assemble the full application router.
#[must_use]
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    routes().layer(cors).with_state(state)
}

async fn info_handler() -> Json<InfoResponse> {
    Json(InfoResponse {
        message: format!("parley {} is running", env!("CARGO_PKG_VERSION")),
    })
}

async fn chat(
    State(st): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = st
        .orchestrator
        .handle_turn(&request.message, request.thread_id)
        .await?;

    if let Some(usage) = &outcome.usage {
        info!(
            "Turn on thread {} used {} tokens",
            outcome.thread_id, usage.total_tokens
        );
    }

    Ok(Json(ChatResponse {
        message: outcome.reply,
        thread_id: outcome.thread_id,
    }))
}

async fn thread_history(
    State(st): State<AppState>,
    Path(thread_id): Path<String>,
) -> Json<HistoryResponse> {
    let messages = st.store.snapshot(&thread_id).await;
    Json(HistoryResponse { messages })
}
