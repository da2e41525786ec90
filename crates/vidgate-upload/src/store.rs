//! In-memory session store.
//!
//! An arena of session records keyed by session id. Each record sits
//! behind its own `tokio::sync::Mutex`, so concurrent chunks for the same
//! session serialize on that session alone and chunks for different
//! sessions never contend.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::session::{SessionState, UploadSession};

/// Handle to one locked session record.
pub type SessionHandle = Arc<Mutex<UploadSession>>;

/// Owns every in-flight `UploadSession`.
///
/// Terminal sessions leave a tombstone recording how they ended, so a
/// late chunk against a finished session can be answered with the
/// session's fate instead of a bare not-found. Tombstones are swept
/// alongside stale sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    closed: DashMap<String, (SessionState, DateTime<Utc>)>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly opened session and return its handle.
    pub fn open(&self, session: UploadSession) -> SessionHandle {
        let id = session.session_id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(id, Arc::clone(&handle));
        handle
    }

    /// Look up a live session. Unknown ids yield `None`, never a default.
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|e| Arc::clone(e.value()))
    }

    /// The terminal state of a session that has already been closed.
    pub fn closed_state(&self, session_id: &str) -> Option<SessionState> {
        self.closed.get(session_id).map(|e| e.value().0)
    }

    /// Remove a session, leaving a tombstone with its terminal state.
    pub fn close(&self, session_id: &str, state: SessionState) {
        self.sessions.remove(session_id);
        self.closed
            .insert(session_id.to_string(), (state, Utc::now()));
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of sessions with no activity since the threshold.
    ///
    /// Handles are collected before locking so no session mutex is awaited
    /// while a map shard is held.
    pub async fn list_stale(&self, older_than: Duration) -> Vec<String> {
        let cutoff = Utc::now() - older_than;

        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut stale = Vec::new();
        for handle in handles {
            let session = handle.lock().await;
            if session.last_activity_at < cutoff {
                stale.push(session.session_id.clone());
            }
        }
        stale
    }

    /// Drop tombstones older than the threshold.
    pub fn prune_closed(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let before = self.closed.len();
        self.closed.retain(|_, (_, closed_at)| *closed_at >= cutoff);
        before - self.closed.len()
    }
}
