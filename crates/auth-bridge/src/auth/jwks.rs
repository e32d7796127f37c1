//! Key Resolver: fetches and caches the identity provider's signing keys.
//!
//! The resolver fetches the JWKS document (Cognito publishes it at
//! `<issuer>/.well-known/jwks.json`) and caches the full key set with a
//! configurable TTL. The set is immutable once published and is replaced
//! wholesale on refresh.
//!
//! # Refresh policy
//!
//! - A fresh set (younger than the TTL) is served from cache.
//! - An unknown `kid` triggers a refresh unless the set was fetched within
//!   the minimum refresh interval, which stops random-`kid` tokens from
//!   hammering the provider.
//! - Concurrent refreshes collapse into one in-flight fetch. Callers that
//!   waited on it reuse its outcome.
//! - On fetch failure the last-known-good set is served while it is within
//!   `ttl + stale_grace` of its fetch time; otherwise the error propagates.
//! - A set is published only after the whole document has been fetched and
//!   parsed, so a cancelled fetch leaves the previous set in place.

use crate::observability::metrics;
use async_trait::async_trait;
use common::jwt::decode_ed25519_public_key_jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Default window past the TTL during which a stale set may still be served.
pub const DEFAULT_STALE_GRACE_SECONDS: u64 = 3600;

/// Default minimum age of a set before an unknown `kid` may refetch it.
pub const DEFAULT_MIN_REFRESH_INTERVAL_SECONDS: u64 = 10;

/// Default bound on a single JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 5;

/// Key resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyResolutionError {
    /// The endpoint could not be reached, timed out, or returned an error status.
    #[error("JWKS endpoint unavailable: {0}")]
    Unavailable(String),

    /// The endpoint answered with something that is not a usable key set.
    #[error("JWKS document malformed: {0}")]
    Malformed(String),

    /// The key set was resolved but holds no key with the requested `kid`.
    #[error("signing key not found in JWKS")]
    UnknownKey,
}

/// JSON Web Key as published in a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for Cognito, "OKP" for Ed25519).
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Algorithm ("RS256" or "EdDSA").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// OKP curve name ("Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Signature algorithms the bridge accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    Rs256,
    EdDsa,
}

impl SigningAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::Rs256 => "RS256",
            SigningAlgorithm::EdDsa => "EdDSA",
        }
    }

    pub fn jwt_algorithm(&self) -> Algorithm {
        match self {
            SigningAlgorithm::Rs256 => Algorithm::RS256,
            SigningAlgorithm::EdDsa => Algorithm::EdDSA,
        }
    }
}

/// A verification key resolved from the JWKS.
///
/// Immutable once fetched.
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub algorithm: SigningAlgorithm,
    decoding_key: DecodingKey,
    pub fetched_at: Instant,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Convert a JWK into a verification key.
    ///
    /// # Errors
    ///
    /// Returns a description of why the JWK is unusable (unsupported type,
    /// algorithm or curve, missing or undecodable key material).
    pub fn from_jwk(jwk: &Jwk, fetched_at: Instant) -> Result<Self, String> {
        if let Some(key_use) = &jwk.key_use {
            if key_use != "sig" {
                return Err(format!("key use '{key_use}' is not 'sig'"));
            }
        }

        let (algorithm, decoding_key) = match jwk.kty.as_str() {
            "RSA" => {
                check_alg(jwk, SigningAlgorithm::Rs256)?;
                let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                    return Err("RSA key missing n or e".to_string());
                };
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| format!("invalid RSA components: {e}"))?;
                (SigningAlgorithm::Rs256, key)
            }
            "OKP" => {
                check_alg(jwk, SigningAlgorithm::EdDsa)?;
                if let Some(crv) = &jwk.crv {
                    if crv != "Ed25519" {
                        return Err(format!("unsupported curve '{crv}'"));
                    }
                }
                let x = jwk.x.as_ref().ok_or("OKP key missing x")?;
                let public_key = decode_ed25519_public_key_jwk(x)
                    .map_err(|e| format!("invalid public key encoding: {e}"))?;
                if public_key.len() != 32 {
                    return Err(format!("Ed25519 key is {} bytes", public_key.len()));
                }
                (SigningAlgorithm::EdDsa, DecodingKey::from_ed_der(&public_key))
            }
            other => return Err(format!("unsupported key type '{other}'")),
        };

        Ok(Self {
            key_id: jwk.kid.clone(),
            algorithm,
            decoding_key,
            fetched_at,
        })
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

fn check_alg(jwk: &Jwk, expected: SigningAlgorithm) -> Result<(), String> {
    match &jwk.alg {
        Some(alg) if alg != expected.as_str() => {
            Err(format!("algorithm '{alg}' does not match key type {}", jwk.kty))
        }
        _ => Ok(()),
    }
}

/// Source of JWKS documents.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetch the current JWKS document.
    async fn fetch(&self) -> Result<JwksDocument, KeyResolutionError>;
}

/// Fetches the JWKS document over HTTPS.
pub struct HttpJwksFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl HttpJwksFetcher {
    pub fn new(jwks_url: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "bridge.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self) -> Result<JwksDocument, KeyResolutionError> {
        tracing::debug!(target: "bridge.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeyResolutionError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeyResolutionError::Unavailable(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<JwksDocument>()
            .await
            .map_err(|e| KeyResolutionError::Malformed(e.to_string()))
    }
}

/// Tuning for the key resolver.
#[derive(Debug, Clone)]
pub struct KeyResolverConfig {
    pub cache_ttl: Duration,
    pub stale_grace: Duration,
    pub min_refresh_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for KeyResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            stale_grace: Duration::from_secs(DEFAULT_STALE_GRACE_SECONDS),
            min_refresh_interval: Duration::from_secs(DEFAULT_MIN_REFRESH_INTERVAL_SECONDS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
        }
    }
}

/// A published key set.
struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Instant,
}

/// Outcome of the most recent completed fetch attempt.
#[derive(Default)]
struct RefreshState {
    last_error: Option<KeyResolutionError>,
}

/// Resolves signing keys by `kid`, caching the provider's key set.
pub struct KeyResolver {
    fetcher: Arc<dyn JwksFetcher>,
    cache: RwLock<Option<Arc<KeySet>>>,
    /// Held for the duration of a fetch; serializes refreshes.
    refresh: Mutex<RefreshState>,
    /// Count of completed fetch attempts, successful or not.
    attempts: AtomicU64,
    config: KeyResolverConfig,
}

impl KeyResolver {
    pub fn new(fetcher: Arc<dyn JwksFetcher>, config: KeyResolverConfig) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
            config,
        }
    }

    /// Get the signing key for `kid`.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Malformed` if a needed refresh failed and no
    ///   last-known-good set is within its grace window
    /// - `UnknownKey` if the resolved set holds no key for `kid`
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyResolutionError> {
        let seen_attempts = self.attempts.load(Ordering::Acquire);
        let current = self.snapshot().await;

        if let Some(set) = &current {
            let age = set.fetched_at.elapsed();
            if age < self.config.cache_ttl {
                if let Some(key) = set.keys.get(kid) {
                    tracing::debug!(target: "bridge.auth.jwks", "JWKS cache hit");
                    return Ok(Arc::clone(key));
                }
                if age < self.config.min_refresh_interval {
                    tracing::debug!(
                        target: "bridge.auth.jwks",
                        "Unknown kid and key set was refreshed recently, not refetching"
                    );
                    return Err(KeyResolutionError::UnknownKey);
                }
            }
        }

        let set = self.refresh(seen_attempts).await?;
        set.keys.get(kid).map(Arc::clone).ok_or_else(|| {
            tracing::warn!(target: "bridge.auth.jwks", "Key not found in JWKS after refresh");
            KeyResolutionError::UnknownKey
        })
    }

    /// Make sure a usable key set is loaded and return its size.
    ///
    /// Used by the readiness probe.
    ///
    /// # Errors
    ///
    /// Same as the refresh path of [`KeyResolver::get_key`].
    pub async fn ensure_loaded(&self) -> Result<usize, KeyResolutionError> {
        let seen_attempts = self.attempts.load(Ordering::Acquire);
        if let Some(set) = self.snapshot().await {
            if set.fetched_at.elapsed() < self.config.cache_ttl {
                return Ok(set.keys.len());
            }
        }
        Ok(self.refresh(seen_attempts).await?.keys.len())
    }

    /// Number of keys in the published set, if any has been published.
    pub async fn cached_key_count(&self) -> Option<usize> {
        self.snapshot().await.map(|set| set.keys.len())
    }

    async fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.cache.read().await.clone()
    }

    /// Refresh the key set, collapsing concurrent callers into one fetch.
    ///
    /// `seen_attempts` is the attempt counter observed before the caller
    /// decided to refresh. If an attempt completed since then, its outcome is
    /// reused instead of fetching again.
    async fn refresh(&self, seen_attempts: u64) -> Result<Arc<KeySet>, KeyResolutionError> {
        let mut state = self.refresh.lock().await;

        if self.attempts.load(Ordering::Acquire) != seen_attempts {
            let current = self.snapshot().await;
            return match (&state.last_error, current) {
                (None, Some(set)) => Ok(set),
                (Some(err), current) => self.stale_fallback(current, err.clone()),
                (None, None) => Err(KeyResolutionError::Unavailable(
                    "no key set published".to_string(),
                )),
            };
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch())
            .await
        {
            Ok(Ok(document)) => build_key_set(document),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(KeyResolutionError::Unavailable(format!(
                "JWKS fetch timed out after {}ms",
                self.config.fetch_timeout.as_millis()
            ))),
        };

        let result = match outcome {
            Ok(set) => {
                let set = Arc::new(set);
                *self.cache.write().await = Some(Arc::clone(&set));
                state.last_error = None;
                metrics::record_jwks_refresh("success", started.elapsed());
                tracing::info!(
                    target: "bridge.auth.jwks",
                    key_count = set.keys.len(),
                    "JWKS cache refreshed"
                );
                Ok(set)
            }
            Err(err) => {
                state.last_error = Some(err.clone());
                metrics::record_jwks_refresh("error", started.elapsed());
                tracing::error!(target: "bridge.auth.jwks", error = %err, "JWKS refresh failed");
                self.stale_fallback(self.snapshot().await, err)
            }
        };

        self.attempts.fetch_add(1, Ordering::AcqRel);
        result
    }

    fn stale_fallback(
        &self,
        current: Option<Arc<KeySet>>,
        err: KeyResolutionError,
    ) -> Result<Arc<KeySet>, KeyResolutionError> {
        match current {
            Some(set) if set.fetched_at.elapsed() < self.config.cache_ttl + self.config.stale_grace => {
                tracing::warn!(
                    target: "bridge.auth.jwks",
                    error = %err,
                    age_secs = set.fetched_at.elapsed().as_secs(),
                    "JWKS refresh failed; serving last-known-good keys"
                );
                metrics::record_jwks_stale_served();
                Ok(set)
            }
            _ => Err(err),
        }
    }
}

fn build_key_set(document: JwksDocument) -> Result<KeySet, KeyResolutionError> {
    let fetched_at = Instant::now();
    let mut keys = HashMap::new();

    for jwk in &document.keys {
        match SigningKey::from_jwk(jwk, fetched_at) {
            Ok(key) => {
                keys.insert(key.key_id.clone(), Arc::new(key));
            }
            Err(reason) => {
                tracing::warn!(target: "bridge.auth.jwks", kid = %jwk.kid, reason = %reason, "Skipping unusable JWK");
            }
        }
    }

    if keys.is_empty() {
        return Err(KeyResolutionError::Malformed(
            "no usable signing keys".to_string(),
        ));
    }

    Ok(KeySet { keys, fetched_at })
}
