//! The ordered event contract consumed by HTTP handlers, and its `axum`
//! SSE serialization.
//!
//! Event ordering is enforced by construction in `retrieval::state_machine`,
//! not re-checked here: `chunk*` precede exactly one `sources`, which
//! precedes exactly one terminal `done`/`error`.

use axum::response::sse::Event;
use serde::Serialize;

use crate::domain::{RetrievedChunk, Route, WebResult};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk { content: String },
    Sources { pdf_sources: Vec<RetrievedChunk>, web_sources: Vec<WebResult>, route_used: Route },
    Done {},
    Error { message: String },
}

impl StreamEvent {
    pub fn into_sse_event(self) -> Event {
        Event::default().json_data(&self).unwrap_or_else(|_| {
            Event::default().data(r#"{"type":"error","message":"failed to serialize event"}"#)
        })
    }
}
