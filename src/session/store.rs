//! In-memory session store with per-session serialization.
//!
//! Each session id owns a slot holding its last completed history. A turn
//! checks the slot out for its whole duration, so two turns for the same
//! session run one after the other instead of racing on the final write.
//! Slots live as long as the process; there is no eviction.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::SessionId;
use crate::gemini::History;

type Slot = Arc<Mutex<Option<History>>>;

/// Process-wide map from session id to conversation history.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Slot>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, session_id: &SessionId) -> Slot {
        Arc::clone(self.sessions.entry(session_id.clone()).or_default().value())
    }

    /// Last completed history for a session.
    ///
    /// Waits for an in-flight turn on the same session to settle, so the
    /// result is never a partial exchange.
    pub async fn get(&self, session_id: &SessionId) -> Option<History> {
        let slot = self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))?;
        let history = slot.lock().await;
        history.clone()
    }

    /// Replace a session's history wholesale.
    pub async fn put(&self, session_id: &SessionId, history: History) {
        let slot = self.slot(session_id);
        *slot.lock().await = Some(history);
    }

    /// Take exclusive hold of a session for one turn.
    ///
    /// Resolves once any earlier turn on the same session has finished.
    pub async fn checkout(&self, session_id: &SessionId) -> SessionLease {
        let guard = self.slot(session_id).lock_owned().await;
        SessionLease {
            session_id: session_id.clone(),
            guard,
        }
    }

    /// Number of sessions seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Exclusive hold on one session for the duration of a turn.
///
/// Dropping the lease without [`commit`](Self::commit) leaves the stored
/// history untouched.
pub struct SessionLease {
    session_id: SessionId,
    guard: OwnedMutexGuard<Option<History>>,
}

impl SessionLease {
    /// Session this lease holds.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Whether no turn has completed for this session yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.guard.is_none()
    }

    /// History to resume from (empty for a new session).
    #[must_use]
    pub fn history(&self) -> History {
        self.guard.clone().unwrap_or_default()
    }

    /// Store the history of a completed turn and release the session.
    pub fn commit(mut self, history: History) {
        *self.guard = Some(history);
    }
}
