//! `GET /chat/history/{id}`, `DELETE /chat/clear/{id}`,
//! `DELETE /clear-vector-store`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Message;
use crate::error::{CoreError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
}

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>> {
    let messages = state
        .sessions
        .history(id)
        .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))?;

    Ok(Json(HistoryResponse { messages }))
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

pub async fn clear_session_handler(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Json<ClearResponse> {
    let cleared = state.sessions.clear(id);
    Json(ClearResponse { cleared })
}

#[derive(Debug, Serialize)]
pub struct ClearVectorStoreResponse {
    pub removed: usize,
}

pub async fn clear_vector_store_handler(State(state): State<Arc<AppState>>) -> Result<Json<ClearVectorStoreResponse>> {
    let removed = state.vector_repo.size().await;
    state.vector_repo.clear().await?;
    Ok(Json(ClearVectorStoreResponse { removed }))
}
