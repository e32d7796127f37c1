//! Request Gate: decides whether a request may proceed.
//!
//! Every request moves `Unauthenticated -> Authenticating` and ends either
//! `Authorized` (a [`Principal`] is attached) or `Rejected` (an [`AuthError`]
//! is rendered).
//!
//! A bearer token takes precedence over the session cookie. Bearer requests
//! get an ephemeral principal and never create a session; sessions are only
//! created through the login endpoint.

use crate::auth::claims::ValidatedClaims;
use crate::auth::jwt::TokenValidator;
use crate::auth::mapping::{ClaimMapper, Permission};
use crate::errors::AuthError;
use crate::observability::metrics;
use crate::session::{Session, SessionBridge};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// A credential presented with a request.
#[derive(Clone)]
pub enum Credential {
    /// `Authorization: Bearer <token>`
    Bearer(SecretString),
    /// Session cookie value.
    Session(SecretString),
}

impl Credential {
    fn path(&self) -> &'static str {
        match self {
            Credential::Bearer(_) => "bearer",
            Credential::Session(_) => "session",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(match self {
            Credential::Bearer(_) => "Bearer",
            Credential::Session(_) => "Session",
        })
        .field(&"[REDACTED]")
        .finish()
    }
}

/// How a principal was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Bearer,
    Session,
}

impl AuthMethod {
    /// Metrics `path` label for principals authenticated this way.
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Bearer => "bearer",
            AuthMethod::Session => "session",
        }
    }
}

/// The identity attached to an authorized request.
#[derive(Clone, Serialize)]
pub struct Principal {
    pub principal_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub groups: BTreeSet<String>,
    pub permissions: BTreeSet<Permission>,
    pub auth_method: AuthMethod,
}

impl Principal {
    fn from_claims(claims: ValidatedClaims, permissions: BTreeSet<Permission>) -> Self {
        Self {
            principal_id: claims.subject,
            display_name: claims.display_name,
            email: claims.email,
            groups: claims.groups,
            permissions,
            auth_method: AuthMethod::Bearer,
        }
    }

    fn from_session(session: Session) -> Self {
        Self {
            principal_id: session.principal_id,
            display_name: session.display_name,
            email: session.email,
            groups: session.groups,
            permissions: session.permissions,
            auth_method: AuthMethod::Session,
        }
    }

    /// Whether the principal holds `permission` (or `TRAC_ADMIN`).
    pub fn has_permission(&self, permission: Permission) -> bool {
        permission.is_satisfied_by(&self.permissions)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("principal_id", &"[REDACTED]")
            .field("groups", &self.groups)
            .field("permissions", &self.permissions)
            .field("auth_method", &self.auth_method)
            .finish_non_exhaustive()
    }
}

/// Per-request gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    Authenticating,
    Authorized,
    Rejected,
}

impl GateState {
    fn advance(&mut self, next: GateState) {
        tracing::trace!(target: "bridge.gate", from = ?*self, to = ?next, "Gate transition");
        *self = next;
    }
}

/// What the host needs from an authentication bridge.
#[async_trait]
pub trait HostAuthenticator: Send + Sync {
    /// Resolve a credential to a principal.
    async fn authenticate(&self, credential: Option<Credential>) -> Result<Principal, AuthError>;

    /// Check that `principal` holds `required`.
    fn authorize(&self, principal: &Principal, required: Permission) -> Result<(), AuthError>;

    /// End the principal's host session.
    async fn on_logout(&self, principal: &Principal) -> Result<(), AuthError>;
}

/// The bridge's [`HostAuthenticator`].
pub struct RequestGate {
    validator: Arc<TokenValidator>,
    sessions: Arc<SessionBridge>,
    mapper: Arc<ClaimMapper>,
    issuer: String,
    audience: String,
}

impl RequestGate {
    pub fn new(
        validator: Arc<TokenValidator>,
        sessions: Arc<SessionBridge>,
        mapper: Arc<ClaimMapper>,
        issuer: String,
        audience: String,
    ) -> Self {
        Self {
            validator,
            sessions,
            mapper,
            issuer,
            audience,
        }
    }

    /// Run the full gate: authenticate, then authorize `required` if given.
    ///
    /// Records the decision and logs rejections with their precise reason.
    ///
    /// # Errors
    ///
    /// The rejection, ready to render.
    #[instrument(skip_all)]
    pub async fn check(
        &self,
        credential: Option<Credential>,
        required: Option<Permission>,
    ) -> Result<Principal, AuthError> {
        let path = credential.as_ref().map_or("none", Credential::path);
        let mut state = GateState::Unauthenticated;
        state.advance(GateState::Authenticating);

        let result = match self.authenticate(credential).await {
            Ok(principal) => match required {
                Some(permission) => self.authorize(&principal, permission).map(|()| principal),
                None => Ok(principal),
            },
            Err(err) => Err(err),
        };

        match &result {
            Ok(principal) => {
                state.advance(GateState::Authorized);
                metrics::record_gate_decision("allowed", path);
                tracing::debug!(
                    target: "bridge.gate",
                    auth_method = ?principal.auth_method,
                    "Request authorized"
                );
            }
            Err(err) => {
                state.advance(GateState::Rejected);
                self.record_rejection(err, path);
            }
        }

        result
    }

    /// Record and log a rejection produced outside [`RequestGate::check`]
    /// (e.g. an unparseable `Authorization` header).
    pub fn record_rejection(&self, err: &AuthError, path: &'static str) {
        metrics::record_gate_decision(err.kind(), path);
        match err {
            AuthError::MappingPolicyViolation(detail) => {
                metrics::record_mapping_policy_violation();
                tracing::error!(
                    target: "bridge.alert",
                    detail = %detail,
                    "Principal holds permissions not traceable to its groups"
                );
            }
            AuthError::Internal | AuthError::StoreUnavailable(_) => {
                tracing::warn!(target: "bridge.gate", kind = err.kind(), error = %err, "Request rejected");
            }
            _ => {
                tracing::info!(target: "bridge.gate", kind = err.kind(), error = %err, "Request rejected");
            }
        }
    }

    /// Validate a bearer token, retrying once if key resolution failed.
    ///
    /// # Errors
    ///
    /// The validator's error. Signature and claim failures are never retried.
    pub async fn validate_bearer(&self, token: &str) -> Result<ValidatedClaims, AuthError> {
        match self
            .validator
            .validate(token, &self.issuer, &self.audience)
            .await
        {
            Err(err) if err.is_retryable() => {
                tracing::debug!(target: "bridge.gate", error = %err, "Key resolution failed, retrying once");
                self.validator
                    .validate(token, &self.issuer, &self.audience)
                    .await
            }
            other => other,
        }
    }

    /// Exchange a bearer token for a host session.
    ///
    /// # Errors
    ///
    /// Token rejections, or `StoreUnavailable`.
    #[instrument(skip_all)]
    pub async fn login(&self, token: &SecretString) -> Result<Session, AuthError> {
        let result = match self.validate_bearer(token.expose_secret()).await {
            Ok(claims) => self.sessions.create_or_refresh(&claims).await,
            Err(err) => Err(err),
        };

        match &result {
            Ok(_) => metrics::record_gate_decision("session_created", "bearer"),
            Err(err) => self.record_rejection(err, "bearer"),
        }
        result
    }

    async fn authenticate_bearer(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.validate_bearer(token).await?;
        let permissions = self.mapper.map_groups(&claims.groups);
        Ok(Principal::from_claims(claims, permissions))
    }

    async fn authenticate_session(&self, session_id: &str) -> Result<Principal, AuthError> {
        let session = self
            .sessions
            .lookup(session_id)
            .await?
            .ok_or(AuthError::SessionExpired)?;

        self.mapper
            .verify_traceable(&session.groups, &session.permissions)?;

        Ok(Principal::from_session(session))
    }
}

#[async_trait]
impl HostAuthenticator for RequestGate {
    async fn authenticate(&self, credential: Option<Credential>) -> Result<Principal, AuthError> {
        match credential {
            Some(Credential::Bearer(token)) => self.authenticate_bearer(token.expose_secret()).await,
            Some(Credential::Session(session_id)) => {
                self.authenticate_session(session_id.expose_secret()).await
            }
            None => Err(AuthError::MissingCredentials(
                "no bearer token or session cookie".to_string(),
            )),
        }
    }

    fn authorize(&self, principal: &Principal, required: Permission) -> Result<(), AuthError> {
        if principal.has_permission(required) {
            Ok(())
        } else {
            tracing::debug!(target: "bridge.gate", required = %required, "Permission not held");
            Err(AuthError::Forbidden(required))
        }
    }

    async fn on_logout(&self, principal: &Principal) -> Result<(), AuthError> {
        self.sessions.invalidate(&principal.principal_id).await?;
        Ok(())
    }
}
