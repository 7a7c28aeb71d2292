use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

pub mod query;
pub mod upload;

const SERVICE_NAME: &str = "csv-insights";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .merge(upload::routes())
        .merge(query::routes())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "CSV Insights API",
        "version": VERSION,
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": VERSION,
    }))
}

async fn detailed_health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut degraded = false;

    let index = match &state.index {
        Some(index) => match index.count().await {
            Ok(count) => json!({ "status": "healthy", "document_count": count }),
            Err(e) => {
                degraded = true;
                json!({ "status": "unhealthy", "error": e.to_string() })
            }
        },
        None => json!({ "status": "disabled" }),
    };

    let storage = match state.storage.storage_info() {
        Ok(info) => json!({
            "status": "healthy",
            "total_files": info.total_files,
            "total_size_mb": info.total_size_mb,
        }),
        Err(e) => {
            degraded = true;
            json!({ "status": "unhealthy", "error": e.to_string() })
        }
    };

    Json(json!({
        "status": if degraded { "degraded" } else { "healthy" },
        "service": SERVICE_NAME,
        "version": VERSION,
        "components": {
            "similarity_index": index,
            "file_storage": storage,
        },
    }))
}
