use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ApiError, AppState};
use crate::chat::{ChatReply, ChatRequest};
use crate::report::ReportRequest;

pub(super) async fn banner() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the dobb-backend API",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "features": [
            "Document embeddings",
            "Chatbot",
            "PRD reports",
            "User stories",
            "GitHub MCP integration",
            "Jira MCP integration"
        ]
    }))
}

/// Liveness plus the size of the vector store
pub(super) async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store = state.pipeline.store();
    match store.count_embeddings().await {
        Ok(vectors) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "vectors": vectors,
                "collection": store.collection(),
                "embedding_model": state.pipeline.model_id(),
            })),
        ),
        Err(e) => {
            warn!("Health check could not read the vector store: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "message": e.to_string(),
                })),
            )
        }
    }
}

pub(super) async fn chatbot(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(request) = payload?;
    debug!("Chat request with {} history turns", request.history.len());
    Ok(Json(state.chat.chat(request).await?))
}

pub(super) async fn generate_report(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.report.generate(request).await?))
}

pub(super) async fn generate_user_stories(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.stories.generate(request).await?))
}
