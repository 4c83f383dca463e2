//! Core domain types shared across every component.
//!
//! These are transport-agnostic: the HTTP wire types in `handlers` convert
//! to and from these, they never leak `axum`/`serde_json::Value` directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A page of extracted text produced by the document loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub source: String,
    pub page_index: usize,
    pub total_pages: usize,
    pub text: String,
}

/// Content-type classification used for chunk metadata enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Explanation,
    Problem,
    Example,
    Introduction,
}

/// Metadata enriched onto a chunk by the chunker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: usize,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub subject: Option<String>,
    pub chapter: Option<u32>,
    pub section: Option<String>,
    pub content_type: Option<ContentType>,
    pub has_math: bool,
}

/// The unit of retrieval: chunker output, vector-store storage unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable content-hash identifier; makes upsert idempotent.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk plus its relevance score from the vector repository, normalized
/// to `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// A single hit from the web search tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub published_date: Option<String>,
    pub snippet: String,
    pub score: f32,
}

/// The router's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    None,
    PdfOnly,
    WebOnly,
    Both,
}

/// A role in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A session's bounded conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            last_touched_at: now,
        }
    }
}

/// Per-query ephemeral state threaded through the retrieval state machine.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub query: String,
    pub history: Vec<Message>,
    pub route: Route,
    pub pdf_context: Option<String>,
    pub pdf_sources: Vec<RetrievedChunk>,
    pub web_context: Option<String>,
    pub web_sources: Vec<WebResult>,
    pub combined_context: Option<String>,
}

impl AgentState {
    pub fn new(query: String, history: Vec<Message>) -> Self {
        Self {
            query,
            history,
            route: Route::None,
            pdf_context: None,
            pdf_sources: Vec::new(),
            web_context: None,
            web_sources: Vec::new(),
            combined_context: None,
        }
    }
}
