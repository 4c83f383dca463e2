//! `POST /query`: a direct vector-search endpoint, bypassing
//! the retrieval state machine entirely — no routing, no web leg, no
//! generation. Useful for callers that want raw retrieved chunks (e.g. a
//! UI's "show me the sources" panel) without paying for a full turn.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::domain::ChunkMetadata;
use crate::error::{CoreError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResultItem {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Vec<QueryResultItem>>> {
    if req.query.trim().is_empty() {
        return Err(CoreError::BadRequest("query must not be empty".to_string()));
    }

    let k = req.k.unwrap_or(state.settings.default_search_k);

    let embedding = state.embedder.embed(&req.query).await?;

    let results = state
        .vector_repo
        .search(&embedding, k, state.settings.relevance_threshold)
        .await?;

    let items = results
        .into_iter()
        .map(|r| QueryResultItem {
            content: r.chunk.text,
            metadata: r.chunk.metadata,
            score: r.score,
        })
        .collect();

    Ok(Json(items))
}
