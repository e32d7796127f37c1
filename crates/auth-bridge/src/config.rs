//! Auth bridge configuration.
//!
//! Configuration is loaded from environment variables. Invalid values fail
//! startup with a [`ConfigError`] naming the variable.

use crate::auth::jwks::{
    KeyResolverConfig, DEFAULT_CACHE_TTL_SECONDS, DEFAULT_FETCH_TIMEOUT_SECONDS,
    DEFAULT_MIN_REFRESH_INTERVAL_SECONDS, DEFAULT_STALE_GRACE_SECONDS,
};
use crate::auth::mapping::{parse_permission_overrides, PermissionOverrides};
use crate::session::{DEFAULT_MAX_LIFETIME_SECONDS, DEFAULT_STORE_TIMEOUT_SECONDS};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "learntrac_session";

/// Default interval between expired-session sweeps.
pub const DEFAULT_SESSION_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Auth bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Expected `iss` claim, e.g. `https://cognito-idp.<region>.amazonaws.com/<pool>`.
    pub issuer: String,

    /// Expected audience: the app client id.
    pub audience: String,

    /// JWKS endpoint (default: `<issuer>/.well-known/jwks.json`).
    pub jwks_uri: String,

    pub jwks_cache_ttl_seconds: u64,
    pub jwks_stale_grace_seconds: u64,
    pub jwks_min_refresh_interval_seconds: u64,
    pub jwks_fetch_timeout_seconds: u64,

    /// Clock skew tolerance for `iat` and `nbf`.
    pub clock_skew_seconds: u64,

    /// Upper bound on a session's lifetime, regardless of token expiry.
    pub session_max_lifetime_seconds: u64,
    pub session_store_timeout_seconds: u64,
    pub session_sweep_interval_seconds: u64,

    pub session_cookie_name: String,

    /// Whether the session cookie carries the `Secure` attribute.
    pub session_cookie_secure: bool,

    /// Per-deployment group mappings merged over the default table.
    pub permission_overrides: PermissionOverrides,

    /// Seconds to keep serving after a shutdown signal before draining.
    pub drain_seconds: u64,

    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    #[error("Invalid PERMISSION_OVERRIDES: {0}")]
    InvalidPermissionOverrides(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load configuration from a map of variables.
    ///
    /// # Errors
    ///
    /// - `MissingEnvVar` if `AUTH_ISSUER` or `AUTH_AUDIENCE` is absent or empty
    /// - `InvalidValue` if a numeric, boolean or name value is out of range
    /// - `InvalidPermissionOverrides` if the overrides JSON is invalid or
    ///   names an unknown permission
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer = required(vars, "AUTH_ISSUER")?;
        let audience = required(vars, "AUTH_AUDIENCE")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_uri = vars.get("AUTH_JWKS_URI").cloned().unwrap_or_else(|| {
            format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'))
        });
        if !(jwks_uri.starts_with("https://") || jwks_uri.starts_with("http://")) {
            return Err(ConfigError::InvalidValue {
                var: "AUTH_JWKS_URI",
                reason: format!("must be an http(s) URL, got '{jwks_uri}'"),
            });
        }

        let jwks_cache_ttl_seconds =
            seconds(vars, "JWKS_CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL_SECONDS, 1)?;
        let jwks_stale_grace_seconds =
            seconds(vars, "JWKS_STALE_GRACE_SECONDS", DEFAULT_STALE_GRACE_SECONDS, 0)?;
        let jwks_min_refresh_interval_seconds = seconds(
            vars,
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_MIN_REFRESH_INTERVAL_SECONDS,
            0,
        )?;
        let jwks_fetch_timeout_seconds =
            seconds(vars, "JWKS_FETCH_TIMEOUT_SECONDS", DEFAULT_FETCH_TIMEOUT_SECONDS, 1)?;

        let clock_skew_seconds =
            seconds(vars, "CLOCK_SKEW_SECONDS", DEFAULT_CLOCK_SKEW.as_secs(), 1)?;
        if clock_skew_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidValue {
                var: "CLOCK_SKEW_SECONDS",
                reason: format!(
                    "must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    clock_skew_seconds
                ),
            });
        }

        let session_max_lifetime_seconds = seconds(
            vars,
            "SESSION_MAX_LIFETIME_SECONDS",
            DEFAULT_MAX_LIFETIME_SECONDS,
            1,
        )?;
        let session_store_timeout_seconds = seconds(
            vars,
            "SESSION_STORE_TIMEOUT_SECONDS",
            DEFAULT_STORE_TIMEOUT_SECONDS,
            1,
        )?;
        let session_sweep_interval_seconds = seconds(
            vars,
            "SESSION_SWEEP_INTERVAL_SECONDS",
            DEFAULT_SESSION_SWEEP_INTERVAL_SECONDS,
            1,
        )?;

        let session_cookie_name = vars
            .get("SESSION_COOKIE_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string());
        if !is_cookie_token(&session_cookie_name) {
            return Err(ConfigError::InvalidValue {
                var: "SESSION_COOKIE_NAME",
                reason: format!("'{session_cookie_name}' is not a valid cookie name"),
            });
        }

        let session_cookie_secure = match vars.get("SESSION_COOKIE_SECURE").map(String::as_str) {
            None | Some("true" | "1") => true,
            Some("false" | "0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "SESSION_COOKIE_SECURE",
                    reason: format!("must be true or false, got '{other}'"),
                })
            }
        };

        let permission_overrides = match vars.get("PERMISSION_OVERRIDES") {
            Some(json) if !json.trim().is_empty() => parse_permission_overrides(json)
                .map_err(ConfigError::InvalidPermissionOverrides)?,
            _ => PermissionOverrides::new(),
        };

        let drain_seconds = seconds(vars, "BRIDGE_DRAIN_SECONDS", 0, 0)?;

        let log_format = match vars.get("LOG_FORMAT").map(String::as_str) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "LOG_FORMAT",
                    reason: format!("must be pretty or json, got '{other}'"),
                })
            }
        };

        Ok(Config {
            bind_address,
            issuer,
            audience,
            jwks_uri,
            jwks_cache_ttl_seconds,
            jwks_stale_grace_seconds,
            jwks_min_refresh_interval_seconds,
            jwks_fetch_timeout_seconds,
            clock_skew_seconds,
            session_max_lifetime_seconds,
            session_store_timeout_seconds,
            session_sweep_interval_seconds,
            session_cookie_name,
            session_cookie_secure,
            permission_overrides,
            drain_seconds,
            log_format,
        })
    }

    pub fn key_resolver_config(&self) -> KeyResolverConfig {
        KeyResolverConfig {
            cache_ttl: Duration::from_secs(self.jwks_cache_ttl_seconds),
            stale_grace: Duration::from_secs(self.jwks_stale_grace_seconds),
            min_refresh_interval: Duration::from_secs(self.jwks_min_refresh_interval_seconds),
            fetch_timeout: Duration::from_secs(self.jwks_fetch_timeout_seconds),
        }
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_seconds)
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Parse an optional whole-seconds value that must be at least `min`.
fn seconds(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: u64,
    min: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(var) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        var,
        reason: format!("must be a non-negative integer, got '{value_str}': {e}"),
    })?;

    if value < min {
        return Err(ConfigError::InvalidValue {
            var,
            reason: format!("must be at least {min}, got {value}"),
        });
    }

    Ok(value)
}

/// RFC 6265 cookie-name token characters.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}
