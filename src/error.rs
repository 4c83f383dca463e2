//! The error-kind taxonomy, one enum shared by every component.
//!
//! Retrieval-path variants are recovered locally and never reach the HTTP
//! boundary as an error status; only ingestion and generation errors are
//! surfaced to the caller, the former as per-file outcomes with a 200
//! overall status, the latter as a terminal SSE `error` event.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Unknown document extension.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// OCR was required (image-based pages) but the `ocr` feature is
    /// not compiled in, or the OCR subsystem failed to initialize.
    #[error("OCR subsystem unavailable: {0}")]
    OcrUnavailable(String),

    /// Embedding call failed; PDF retrieval degrades to empty.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Vector store add/search failed; PDF retrieval degrades to empty.
    #[error("vector store failed: {0}")]
    VectorStoreFailed(String),

    /// Web search provider failed; web retrieval degrades to empty.
    #[error("web search failed: {0}")]
    WebSearchFailed(String),

    /// Router's LLM classifier failed; deterministic fallback is used.
    #[error("route classifier failed: {0}")]
    RouteClassifierFailed(String),

    /// A retrieval task exceeded `RETRIEVAL_DEADLINE_MS`.
    #[error("retrieval deadline exceeded")]
    RetrievalDeadlineExceeded,

    /// No deltas were produced before the generator failed; fatal to
    /// the turn, no assistant message is persisted.
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Generation failed after at least one delta was emitted.
    #[error("generation interrupted: {0}")]
    GenerationInterrupted(String),

    /// Explicit `history`/`clear` against an unknown session id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// HTTP-layer validation failures (missing fields, bad JSON, etc.).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Anything else, typically wrapped via `anyhow`.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// User-safe message for a terminal SSE `error` event. Never leaks
    /// internal detail (file paths, upstream error bodies).
    pub fn user_message(&self) -> String {
        match self {
            CoreError::GenerationUnavailable(_) => {
                "the assistant is temporarily unavailable, please try again".to_string()
            }
            CoreError::GenerationInterrupted(_) => {
                "the response was interrupted, please try again".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            CoreError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "UnsupportedFormat"),
            CoreError::OcrUnavailable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "OCRUnavailable"),
            CoreError::EmbeddingFailed(_) => (StatusCode::BAD_GATEWAY, "EmbeddingFailed"),
            CoreError::VectorStoreFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "VectorStoreFailed"),
            CoreError::WebSearchFailed(_) => (StatusCode::BAD_GATEWAY, "WebSearchFailed"),
            CoreError::RouteClassifierFailed(_) => (StatusCode::OK, "RouteClassifierFailed"),
            CoreError::RetrievalDeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "RetrievalDeadlineExceeded"),
            CoreError::GenerationUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "GenerationUnavailable"),
            CoreError::GenerationInterrupted(_) => (StatusCode::INTERNAL_SERVER_ERROR, "GenerationInterrupted"),
            CoreError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SessionNotFound"),
            CoreError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        if status.is_server_error() {
            tracing::error!(kind, error = %self, "request failed");
        } else {
            tracing::warn!(kind, error = %self, "request rejected");
        }

        let body = Json(ErrorBody {
            error: kind.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
