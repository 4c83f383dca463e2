//! `POST /chat` and `POST /chat/stream`: both drive a single retrieval
//! turn (`retrieval::run_turn`); `/chat` drains the event stream into one
//! JSON response, `/chat/stream` forwards each event as SSE. Session
//! persistence (a turn that errs before generation appends only the user
//! message) lives here rather than in the state machine, since the state
//! machine only yields events — it never touches the session manager.
//!
//! `/chat/stream` uses the `Sse::new(..).keep_alive(..)` idiom; the
//! non-streaming `/chat` is built from the same event stream by running
//! it to completion server-side.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Message, RetrievedChunk, Route, WebResult};
use crate::error::{CoreError, Result};
use crate::retrieval::{self, TurnDeps};
use crate::state::AppState;
use crate::streaming::StreamEvent;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<Uuid>,
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
}

fn default_use_rag() -> bool {
    true
}

#[derive(Debug, Default, Serialize)]
pub struct ChatSources {
    pub pdf_sources: Vec<RetrievedChunk>,
    pub web_sources: Vec<WebResult>,
    pub route_used: Option<Route>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: Uuid,
    pub sources: Option<ChatSources>,
}

/// Refuses to mint a brand-new session under memory pressure (the
/// `SessionManager`'s `sysinfo`-backed admission guard); a request naming
/// an existing `session_id` is never rejected here since it does not
/// create anything.
fn reject_new_session_under_memory_pressure(state: &AppState, session_id: Option<Uuid>) -> Result<()> {
    let would_create_new = match session_id {
        None => true,
        Some(id) => !state.sessions.contains(id),
    };
    if would_create_new && !state.sessions.can_create_new_session() {
        return Err(CoreError::GenerationUnavailable(
            "the server is under memory pressure and cannot start a new session".to_string(),
        ));
    }
    Ok(())
}

fn turn_deps(state: &AppState) -> TurnDeps {
    TurnDeps {
        vector_repo: state.vector_repo.clone(),
        embedder: state.embedder.clone(),
        web_search: state.web_search.clone(),
        generator: state.generator.clone(),
        limiters: state.limiters.clone(),
        settings: state.settings.clone(),
    }
}

/// `POST /chat`. Runs a full turn and returns the assembled answer; callers
/// that want incremental tokens should use `/chat/stream` instead.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    if req.message.trim().is_empty() {
        return Err(CoreError::BadRequest("message must not be empty".to_string()));
    }
    reject_new_session_under_memory_pressure(&state, req.session_id)?;

    // Serializes this turn against any other turn on the same session id;
    // distinct sessions proceed fully concurrently. A brand-new session has
    // no other caller to race against yet, so only an explicit id is locked.
    let _turn_guard = match req.session_id {
        Some(id) => Some(state.sessions.lock_turn(id).await),
        None => None,
    };

    let (session_id, history) = state.sessions.get_or_create(req.session_id);
    let user_message = Message::user(req.message.clone());

    let mut events = Box::pin(retrieval::run_turn(
        req.message.clone(),
        history,
        turn_deps(&state),
        req.use_rag,
    ));

    let mut answer = String::new();
    let mut sources = None;

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Chunk { content } => answer.push_str(&content),
            StreamEvent::Sources { pdf_sources, web_sources, route_used } => {
                sources = Some(ChatSources { pdf_sources, web_sources, route_used: Some(route_used) });
            }
            StreamEvent::Done {} => {
                state.sessions.append(session_id, user_message.clone(), Message::assistant(answer.clone()));
                return Ok(Json(ChatResponse { response: answer, session_id, sources }));
            }
            StreamEvent::Error { message } => {
                state.sessions.append_user_only(session_id, user_message);
                return Err(CoreError::GenerationUnavailable(message));
            }
        }
    }

    // The stream ended without a terminal event; treat as an unavailable turn.
    state.sessions.append_user_only(session_id, user_message);
    Err(CoreError::GenerationUnavailable("the turn ended without a response".to_string()))
}

/// `POST /chat/stream`. Forwards the state machine's event stream as SSE
/// (`chunk* sources done|error`), appending to the session history once
/// the terminal event is observed.
pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    if req.message.trim().is_empty() {
        return Err(CoreError::BadRequest("message must not be empty".to_string()));
    }
    reject_new_session_under_memory_pressure(&state, req.session_id)?;

    // Held for the whole streamed turn, including while the caller drains
    // `chunk` events, so a second request against the same session id
    // queues behind this one rather than racing its history read/append.
    let turn_guard = match req.session_id {
        Some(id) => Some(state.sessions.lock_turn(id).await),
        None => None,
    };

    let (session_id, history) = state.sessions.get_or_create(req.session_id);
    let user_message = Message::user(req.message.clone());
    let sessions = state.sessions.clone();

    let inner = retrieval::run_turn(req.message.clone(), history, turn_deps(&state), req.use_rag);

    let sse_stream = async_stream::stream! {
        let _turn_guard = turn_guard;
        let mut inner = Box::pin(inner);
        let mut answer = String::new();

        while let Some(event) = inner.next().await {
            match &event {
                StreamEvent::Chunk { content } => answer.push_str(content),
                StreamEvent::Done {} => {
                    sessions.append(session_id, user_message.clone(), Message::assistant(answer.clone()));
                }
                StreamEvent::Error { .. } => {
                    sessions.append_user_only(session_id, user_message.clone());
                }
                StreamEvent::Sources { .. } => {}
            }
            yield Ok(event.into_sse_event());
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}
