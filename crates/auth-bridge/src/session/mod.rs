//! Session Bridge: turns validated tokens into host sessions.
//!
//! At most one live session exists per principal. Logging in again while a
//! session is live refreshes it in place: the session id is kept, the expiry
//! only moves forward (never past `created_at + max_lifetime`), and groups
//! and permissions are recomputed from the newer token.

pub mod store;

use crate::auth::claims::{ClaimCheck, ValidatedClaims};
use crate::auth::mapping::{ClaimMapper, Permission};
use crate::errors::AuthError;
use crate::observability::metrics;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use store::{SessionStore, StoreError};
use tracing::instrument;

pub use store::InMemorySessionStore;

/// Default upper bound on a session's lifetime (8 hours).
pub const DEFAULT_MAX_LIFETIME_SECONDS: u64 = 28_800;

/// Default bound on a single store round trip.
pub const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 5;

/// Session ids are 256 bits of CSPRNG output.
const SESSION_ID_BYTES: usize = 32;

/// A host session.
#[derive(Clone, Serialize)]
pub struct Session {
    /// Cookie value. Never serialized into response bodies.
    #[serde(skip)]
    pub session_id: String,
    pub principal_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub groups: BTreeSet<String>,
    pub permissions: BTreeSet<Permission>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Seconds left before the session lapses, zero if it already has.
    pub fn remaining_seconds(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &"[REDACTED]")
            .field("principal_id", &"[REDACTED]")
            .field("groups", &self.groups)
            .field("permissions", &self.permissions)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Creates, refreshes, looks up and destroys sessions.
pub struct SessionBridge {
    store: Arc<dyn SessionStore>,
    mapper: Arc<ClaimMapper>,
    max_lifetime: Duration,
    store_timeout: Duration,
    rng: SystemRandom,
}

impl SessionBridge {
    pub fn new(
        store: Arc<dyn SessionStore>,
        mapper: Arc<ClaimMapper>,
        max_lifetime: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            mapper,
            max_lifetime,
            store_timeout,
            rng: SystemRandom::new(),
        }
    }

    /// Create a session for `claims`, or refresh the principal's live one.
    ///
    /// # Errors
    ///
    /// - `ClaimValidation(Expired)` if the token's expiry has already passed,
    ///   which can happen for a token validated in its final second
    /// - `StoreUnavailable` if the store fails or times out
    pub async fn create_or_refresh(&self, claims: &ValidatedClaims) -> Result<Session, AuthError> {
        self.create_or_refresh_at(claims, chrono::Utc::now().timestamp())
            .await
    }

    #[instrument(skip_all)]
    pub async fn create_or_refresh_at(
        &self,
        claims: &ValidatedClaims,
        now: i64,
    ) -> Result<Session, AuthError> {
        #[allow(clippy::cast_possible_wrap)]
        let max_lifetime = self.max_lifetime.as_secs() as i64;
        let token_expiry = claims.expires_at;
        let computed_expiry = now.saturating_add(max_lifetime).min(token_expiry);
        if computed_expiry <= now {
            tracing::debug!(target: "bridge.session", "Token expiry already passed, not creating session");
            return Err(AuthError::ClaimValidation(ClaimCheck::Expired));
        }

        let groups = claims.groups.clone();
        let permissions = self.mapper.map_groups(&groups);
        let fresh_id = self.generate_session_id()?;
        let principal_id = claims.subject.clone();
        let display_name = claims.display_name.clone();
        let email = claims.email.clone();

        let merge_id = fresh_id.clone();
        let merge_principal = principal_id.clone();
        let merge: store::SessionMerge = Box::new(move |live| match live {
            Some(mut session) => {
                // The policy horizon is fixed at creation; refreshes never move it.
                let policy_expiry = session.created_at.saturating_add(max_lifetime);
                session.expires_at = session.expires_at.max(policy_expiry.min(token_expiry));
                session.groups = groups;
                session.permissions = permissions;
                session.display_name = display_name;
                session.email = email;
                session
            }
            None => Session {
                session_id: merge_id,
                principal_id: merge_principal,
                display_name,
                email,
                groups,
                permissions,
                created_at: now,
                expires_at: computed_expiry,
            },
        });

        let session = self
            .bounded(self.store.upsert(&principal_id, merge, now))
            .await?;

        if session.session_id == fresh_id {
            tracing::info!(
                target: "bridge.session",
                expires_at = session.expires_at,
                permission_count = session.permissions.len(),
                "Session created"
            );
        } else {
            tracing::info!(
                target: "bridge.session",
                expires_at = session.expires_at,
                permission_count = session.permissions.len(),
                "Session refreshed"
            );
        }
        self.report_active().await;

        Ok(session)
    }

    /// Find a live session by its id.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store fails or times out.
    pub async fn lookup(&self, session_id: &str) -> Result<Option<Session>, AuthError> {
        self.lookup_at(session_id, chrono::Utc::now().timestamp())
            .await
    }

    pub async fn lookup_at(&self, session_id: &str, now: i64) -> Result<Option<Session>, AuthError> {
        self.bounded(self.store.get(session_id, now)).await
    }

    /// Destroy the principal's session. Idempotent.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store fails or times out.
    pub async fn invalidate(&self, principal_id: &str) -> Result<bool, AuthError> {
        let removed = self
            .bounded(self.store.remove_principal(principal_id))
            .await?;
        if removed.is_some() {
            tracing::info!(target: "bridge.session", "Session invalidated");
            self.report_active().await;
        }
        Ok(removed.is_some())
    }

    /// Destroy a session by its id. Idempotent.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store fails or times out.
    pub async fn invalidate_session(&self, session_id: &str) -> Result<Option<Session>, AuthError> {
        let removed = self.bounded(self.store.remove_session(session_id)).await?;
        if removed.is_some() {
            tracing::info!(target: "bridge.session", "Session invalidated by reference");
            self.report_active().await;
        }
        Ok(removed)
    }

    /// Remove lapsed sessions.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store fails or times out.
    pub async fn purge_expired(&self) -> Result<usize, AuthError> {
        self.purge_expired_at(chrono::Utc::now().timestamp()).await
    }

    pub async fn purge_expired_at(&self, now: i64) -> Result<usize, AuthError> {
        let purged = self.bounded(self.store.purge_expired(now)).await?;
        if purged > 0 {
            metrics::record_sessions_purged(purged);
            self.report_active().await;
        }
        Ok(purged)
    }

    fn generate_session_id(&self) -> Result<String, AuthError> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| {
            tracing::error!(target: "bridge.session", "CSPRNG failure generating session id");
            AuthError::Internal
        })?;
        Ok(hex::encode(bytes))
    }

    async fn report_active(&self) {
        if let Ok(Ok(count)) = tokio::time::timeout(self.store_timeout, self.store.count()).await {
            metrics::set_sessions_active(count);
        }
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.store_timeout, operation).await {
            Ok(result) => result.map_err(|e| AuthError::StoreUnavailable(e.to_string())),
            Err(_) => {
                tracing::warn!(
                    target: "bridge.session",
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Session store round trip timed out"
                );
                Err(AuthError::StoreUnavailable("store timed out".to_string()))
            }
        }
    }
}
