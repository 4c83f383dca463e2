//! Session manager: an in-memory, per-session bounded history.
//!
//! Process-lifetime state, purely ephemeral — there is no durable session
//! storage. A `dashmap`-backed session map gives lock-free reads across
//! distinct sessions, with a per-entry lock obtained implicitly by
//! `DashMap`'s sharded locking so turns against different sessions never
//! contend, plus a `parking_lot::Mutex<sysinfo::System>` RAM admission guard
//! (`can_create_new_session`, same 90%-used-memory cutoff) reused as-is to
//! reject brand-new sessions under memory pressure — existing sessions are
//! never evicted by it, only new-session creation is refused.
//!
//! A second map of `tokio::sync::Mutex` handles, one per session id, gives
//! callers a way to serialize an entire turn (history read through
//! history-append) against that session, as required of turns in one
//! session — distinct sessions still run fully concurrently since each gets
//! its own lock.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use sysinfo::System;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{Message, Session};

/// Above this percentage of system memory in use, `get_or_create` refuses
/// to mint brand-new sessions (existing sessions are unaffected).
const MAX_MEMORY_USAGE_PERCENT: f64 = 90.0;

pub struct SessionManager {
    sessions: DashMap<Uuid, Session>,
    turn_locks: DashMap<Uuid, Arc<AsyncMutex<()>>>,
    max_history_messages: usize,
    system: Mutex<System>,
}

impl SessionManager {
    pub fn new(max_history_messages: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            turn_locks: DashMap::new(),
            max_history_messages,
            system: Mutex::new(System::new_all()),
        }
    }

    /// Acquires the per-session turn lock, serializing every turn against
    /// `id` while leaving other sessions fully concurrent. Hold the
    /// returned guard for the whole turn: from the history read through the
    /// post-generation append.
    pub async fn lock_turn(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .turn_locks
            .entry(id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Whether system memory headroom allows admitting a new session. An
    /// unknown `id` naming an *existing* session is always served from the
    /// map regardless of this check; only brand-new session creation is
    /// gated.
    pub fn can_create_new_session(&self) -> bool {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return true;
        }
        let usage_percent = (sys.used_memory() as f64 / total as f64) * 100.0;
        if usage_percent >= MAX_MEMORY_USAGE_PERCENT {
            tracing::warn!(usage_percent, "memory usage too high, rejecting new session");
            return false;
        }
        true
    }

    /// Whether `id` already names a live session — callers use this to
    /// decide whether `get_or_create` would mint a brand-new session (and
    /// so whether the RAM admission guard applies) before calling it.
    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Returns the session id and its current history, creating a new
    /// session when `id` is `None` or unknown.
    pub fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, Vec<Message>) {
        let id = id.unwrap_or_else(Uuid::new_v4);

        let history = self
            .sessions
            .entry(id)
            .or_insert_with(|| Session::new(id))
            .messages
            .clone();

        (id, history)
    }

    /// Appends a completed turn (user + assistant message), evicting the
    /// oldest pair first if the bound would be exceeded.
    pub fn append(&self, id: Uuid, user_msg: Message, assistant_msg: Message) {
        let mut session = self.sessions.entry(id).or_insert_with(|| Session::new(id));
        session.messages.push(user_msg);
        session.messages.push(assistant_msg);

        while session.messages.len() > self.max_history_messages {
            session.messages.remove(0);
        }

        session.last_touched_at = chrono::Utc::now();
    }

    /// Appends only the user message, for turns that error before generation
    /// produces an assistant reply.
    pub fn append_user_only(&self, id: Uuid, user_msg: Message) {
        let mut session = self.sessions.entry(id).or_insert_with(|| Session::new(id));
        session.messages.push(user_msg);

        while session.messages.len() > self.max_history_messages {
            session.messages.remove(0);
        }

        session.last_touched_at = chrono::Utc::now();
    }

    pub fn history(&self, id: Uuid) -> Option<Vec<Message>> {
        self.sessions.get(&id).map(|s| s.messages.clone())
    }

    pub fn clear(&self, id: Uuid) -> bool {
        self.turn_locks.remove(&id);
        self.sessions.remove(&id).is_some()
    }
}
