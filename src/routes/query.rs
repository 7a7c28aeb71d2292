use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    error::AppError,
    models::PromptContext,
    services::session::SessionEntry,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ask", post(ask_question))
        .route("/ask/sessions/:session_id/history", get(session_history))
        .route("/ask/sessions/:session_id", delete(clear_session))
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    question: String,
    #[serde(default)]
    context: Option<PromptContext>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    answer: String,
    confidence: f64,
    sources: Vec<String>,
    session_id: Option<String>,
    processing_time: f64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    session_id: String,
    queries: Vec<SessionEntry>,
}

async fn ask_question(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let start = std::time::Instant::now();
    if request.question.trim().is_empty() {
        return Err(AppError::InvalidInput("Question must not be empty".to_string()));
    }

    let answer = state
        .query_service
        .process_query(
            &request.question,
            request.context,
            request.session_id.as_deref(),
            request.file_id.as_deref(),
        )
        .await?;

    let processing_time = start.elapsed().as_secs_f64();
    tracing::info!("Processed query in {:.2}s", processing_time);

    Ok(Json(AskResponse {
        answer: answer.text,
        confidence: answer.confidence,
        sources: answer.sources,
        session_id: request.session_id,
        processing_time,
    }))
}

async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<HistoryResponse> {
    let queries = state.sessions.get(&session_id);
    Json(HistoryResponse { session_id, queries })
}

async fn clear_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    state.sessions.delete(&session_id);
    Json(json!({
        "message": format!("Session {} cleared successfully", session_id)
    }))
}
