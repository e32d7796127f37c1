//! Session storage.
//!
//! The bridge talks to storage through [`SessionStore`] so a shared backend
//! can replace the in-memory store without touching session semantics.

use super::Session;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Storage failures. Surfaced to clients as 503.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Computes the session to store from the live session for the principal,
/// if any.
pub type SessionMerge = Box<dyn FnOnce(Option<Session>) -> Session + Send>;

/// Session persistence keyed by principal id, with a session-id index.
///
/// Implementations must apply each mutation atomically: a concurrent reader
/// never sees the principal entry and the id index disagree.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Replace the principal's session with `merge(live_session)`.
    ///
    /// A session that has lapsed at `now` is passed to `merge` as `None`.
    async fn upsert(
        &self,
        principal_id: &str,
        merge: SessionMerge,
        now: i64,
    ) -> Result<Session, StoreError>;

    /// Find a live session by id. A lapsed session is removed and reported
    /// as absent.
    async fn get(&self, session_id: &str, now: i64) -> Result<Option<Session>, StoreError>;

    /// Remove the principal's session, returning it if there was one.
    async fn remove_principal(&self, principal_id: &str) -> Result<Option<Session>, StoreError>;

    /// Remove a session by id, returning it if there was one.
    async fn remove_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Remove every session lapsed at `now`, returning how many were removed.
    async fn purge_expired(&self, now: i64) -> Result<usize, StoreError>;

    /// Number of stored sessions, lapsed or not.
    async fn count(&self) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct Sessions {
    by_principal: HashMap<String, Session>,
    /// session_id -> principal_id
    by_id: HashMap<String, String>,
}

impl Sessions {
    fn remove_principal(&mut self, principal_id: &str) -> Option<Session> {
        let session = self.by_principal.remove(principal_id)?;
        self.by_id.remove(&session.session_id);
        Some(session)
    }
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<Sessions>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn upsert(
        &self,
        principal_id: &str,
        merge: SessionMerge,
        now: i64,
    ) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;

        let live = sessions
            .remove_principal(principal_id)
            .filter(|existing| !existing.is_expired_at(now));
        let session = merge(live);

        sessions
            .by_id
            .insert(session.session_id.clone(), principal_id.to_string());
        sessions
            .by_principal
            .insert(principal_id.to_string(), session.clone());

        Ok(session)
    }

    async fn get(&self, session_id: &str, now: i64) -> Result<Option<Session>, StoreError> {
        {
            let sessions = self.sessions.read().await;
            let Some(principal_id) = sessions.by_id.get(session_id) else {
                return Ok(None);
            };
            match sessions.by_principal.get(principal_id) {
                Some(session) if !session.is_expired_at(now) => return Ok(Some(session.clone())),
                _ => {}
            }
        }

        // Lapsed: drop it, re-checking under the write guard in case it was
        // refreshed in between.
        let mut sessions = self.sessions.write().await;
        let Some(principal_id) = sessions.by_id.get(session_id).cloned() else {
            return Ok(None);
        };
        match sessions.by_principal.get(&principal_id) {
            Some(session) if !session.is_expired_at(now) => Ok(Some(session.clone())),
            _ => {
                sessions.remove_principal(&principal_id);
                sessions.by_id.remove(session_id);
                Ok(None)
            }
        }
    }

    async fn remove_principal(&self, principal_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.write().await.remove_principal(principal_id))
    }

    async fn remove_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        let Some(principal_id) = sessions.by_id.remove(session_id) else {
            return Ok(None);
        };
        Ok(sessions.remove_principal(&principal_id))
    }

    async fn purge_expired(&self, now: i64) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let lapsed: Vec<String> = sessions
            .by_principal
            .iter()
            .filter(|(_, session)| session.is_expired_at(now))
            .map(|(principal_id, _)| principal_id.clone())
            .collect();

        for principal_id in &lapsed {
            sessions.remove_principal(principal_id);
        }
        Ok(lapsed.len())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().await.by_principal.len())
    }
}
