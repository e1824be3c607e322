//! In-memory per-user conversation sessions.
//!
//! Sessions are not persisted: after a restart every user starts from the
//! state derived from their record.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::state::ConversationState;

/// Conversation position of one user.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// `None` until the first event of this process is handled.
    pub state: Option<ConversationState>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn set_state(&mut self, state: ConversationState) {
        self.state = Some(state);
        self.updated_at = Some(Utc::now());
    }
}

/// Exclusive access to one user's session.
pub type SessionGuard = OwnedMutexGuard<Session>;

/// All sessions, one mutex per user.
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<i64, Arc<Mutex<Session>>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the session of `user_id`, creating it if needed.
    ///
    /// Holding the guard is what keeps a user's transitions one at a time.
    pub async fn lock(&self, user_id: i64) -> SessionGuard {
        let existing = self.sessions.read().await.get(&user_id).cloned();
        let session = match existing {
            Some(session) => session,
            None => {
                let mut sessions = self.sessions.write().await;
                Arc::clone(sessions.entry(user_id).or_default())
            }
        };
        session.lock_owned().await
    }

    /// Current state of `user_id`, if a session exists and is idle.
    ///
    /// Inspection helper: never blocks, so a session held by an in-flight
    /// transition reads as `None`.
    pub async fn state_of(&self, user_id: i64) -> Option<ConversationState> {
        let session = self.sessions.read().await.get(&user_id).cloned()?;
        let guard = session.try_lock().ok()?;
        guard.state
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn new_session_has_no_state() {
        let table = SessionTable::new();
        let guard = table.lock(7).await;
        assert!(guard.state.is_none());
        assert!(guard.updated_at.is_none());
        drop(guard);
        assert_eq!(table.len().await, 1);
        assert_eq!(table.state_of(7).await, None);
    }

    #[tokio::test]
    async fn state_survives_between_locks() {
        let table = SessionTable::new();
        {
            let mut guard = table.lock(7).await;
            guard.set_state(ConversationState::AskFaculty);
        }
        assert_eq!(table.state_of(7).await, Some(ConversationState::AskFaculty));
        assert_eq!(table.state_of(8).await, None);
    }

    #[tokio::test]
    async fn same_user_is_serialized() {
        let table = Arc::new(SessionTable::new());
        let guard = table.lock(1).await;

        let other = Arc::clone(&table);
        let waiter = tokio::spawn(async move {
            let mut g = other.lock(1).await;
            g.set_state(ConversationState::AskGroup);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second lock must wait for the first");

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(table.state_of(1).await, Some(ConversationState::AskGroup));
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let table = SessionTable::new();
        let _first = table.lock(1).await;
        let second = tokio::time::timeout(Duration::from_millis(100), table.lock(2)).await;
        assert!(second.is_ok());
    }
}
