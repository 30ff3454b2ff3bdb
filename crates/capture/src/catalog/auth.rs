//! Catalogue authentication lifecycle
//!
//! Keeps a usable bearer token available to the capture worker:
//! 1. cached token still valid → use it
//! 2. otherwise refresh with the cached refresh token
//! 3. otherwise ask the host for an interactive login
//!
//! Repeated interactive failures switch to a long fixed backoff so an
//! unattended worker doesn't hammer the login page.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::host::CaptureHost;
use crate::models::AuthCache;
use crate::storage::AuthStore;

/// Consecutive interactive-login failures before the long backoff kicks in
pub const BOOTSTRAP_FAILURE_THRESHOLD: u32 = 3;

/// Fixed wait applied once the bootstrap threshold is reached
pub const BOOTSTRAP_BACKOFF_SECS: f64 = 300.0;

/// Errors from token handling
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no cached credentials")]
    Missing,
    #[error("token refresh failed: {0}")]
    Refresh(String),
    #[error("could not decode token: {0}")]
    Decode(String),
}

/// Exchanges a refresh token for a new bearer token
pub trait TokenRefresher: Send + Sync {
    /// Return an updated copy of `cache` with fresh tokens
    fn refresh(&self, cache: &AuthCache) -> Result<AuthCache, AuthError>;
}

/// Request body for the refresh endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token response from the refresh endpoint
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "accessToken", alias = "access_token")]
    token: String,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
}

/// Refreshes tokens by POSTing to `{rpc_host}{refresh_path}`
pub struct HttpTokenRefresher {
    agent: ureq::Agent,
    refresh_path: String,
}

impl HttpTokenRefresher {
    const TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(refresh_path: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Self::TIMEOUT))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            refresh_path: refresh_path.into(),
        }
    }

    fn endpoint(&self, rpc_host: &str) -> String {
        let host = rpc_host.trim_end_matches('/');
        if self.refresh_path.starts_with('/') {
            format!("{}{}", host, self.refresh_path)
        } else {
            format!("{}/{}", host, self.refresh_path)
        }
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh(&self, cache: &AuthCache) -> Result<AuthCache, AuthError> {
        let refresh_token = cache.refresh().ok_or(AuthError::Missing)?;
        let rpc_host = cache
            .rpc_host
            .as_deref()
            .ok_or_else(|| AuthError::Refresh("no API host cached".to_string()))?;

        let mut request = self.agent.post(&self.endpoint(rpc_host));
        if let Some(ua) = cache.user_agent.as_deref() {
            request = request.header("User-Agent", ua);
        }

        let mut response = request
            .send_json(&RefreshRequest { refresh_token })
            .map_err(|e| AuthError::Refresh(e.to_string()))?;

        let token: RefreshResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| AuthError::Refresh(format!("invalid refresh response: {}", e)))?;

        Ok(cache.clone().with_tokens(token.token, token.refresh_token))
    }
}

/// Outcome of an auth check
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    /// A usable credential set
    Ready(AuthCache),
    /// No credentials this cycle. `retry_after` is set once the bootstrap
    /// failure threshold is reached.
    Unavailable {
        reason: String,
        retry_after: Option<f64>,
    },
}

/// Validates, refreshes and bootstraps catalogue credentials
pub struct Authenticator {
    store: Arc<dyn AuthStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    bootstrap_failures: u32,
}

impl Authenticator {
    pub fn new(store: Arc<dyn AuthStore>, refresher: Option<Arc<dyn TokenRefresher>>) -> Self {
        Self {
            store,
            refresher,
            bootstrap_failures: 0,
        }
    }

    /// Consecutive interactive-login failures so far
    pub fn bootstrap_failures(&self) -> u32 {
        self.bootstrap_failures
    }

    /// Get a usable credential set, refreshing or logging in as needed
    pub fn ensure(&mut self, host: &dyn CaptureHost) -> AuthStatus {
        self.ensure_at(host, Utc::now())
    }

    /// [`ensure`](Self::ensure) with an explicit clock
    pub fn ensure_at(&mut self, host: &dyn CaptureHost, now: DateTime<Utc>) -> AuthStatus {
        // A failed read is treated like a cleared cache: log in again.
        let cached = match self.store.load() {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Failed to read auth cache: {:#}", e);
                None
            }
        };

        if let Some(cache) = &cached
            && cache.is_valid_at(now)
        {
            return AuthStatus::Ready(cache.clone());
        }

        if let Some(cache) = &cached
            && cache.refresh().is_some()
            && let Some(refresher) = &self.refresher
        {
            match refresher.refresh(cache) {
                Ok(updated) if updated.bearer().is_some() => {
                    info!("Refreshed catalogue token");
                    host.capture_log("Session refreshed");
                    self.persist(&updated);
                    self.bootstrap_failures = 0;
                    return AuthStatus::Ready(updated);
                }
                Ok(_) => warn!("Token refresh returned an empty token"),
                Err(e) => {
                    warn!("{}", e);
                    host.capture_log(&format!("Session refresh failed: {}", e));
                }
            }
        }

        self.bootstrap(host, cached.as_ref())
    }

    /// Drop the cached bearer token so the next check refreshes
    ///
    /// Called after the API rejects a token that still looked valid locally.
    pub fn invalidate(&self) {
        match self.store.load() {
            Ok(Some(mut cache)) => {
                cache.token = None;
                self.persist(&cache);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read auth cache: {:#}", e),
        }
    }

    fn bootstrap(&mut self, host: &dyn CaptureHost, cached: Option<&AuthCache>) -> AuthStatus {
        host.capture_log("Sign-in required; starting interactive login");

        match host.prompt_manual_login() {
            Some(login) if login.bearer().is_some() => {
                let merged = merge_login(login, cached);
                self.persist(&merged);
                self.bootstrap_failures = 0;
                host.capture_log("Signed in");
                AuthStatus::Ready(merged)
            }
            _ => {
                self.bootstrap_failures += 1;
                let retry_after = (self.bootstrap_failures >= BOOTSTRAP_FAILURE_THRESHOLD)
                    .then_some(BOOTSTRAP_BACKOFF_SECS);
                let reason = format!(
                    "Interactive login failed ({} consecutive)",
                    self.bootstrap_failures
                );
                warn!("{}", reason);
                AuthStatus::Unavailable {
                    reason,
                    retry_after,
                }
            }
        }
    }

    fn persist(&self, cache: &AuthCache) {
        if let Err(e) = self.store.save(cache) {
            warn!("Failed to save auth cache: {:#}", e);
        }
    }
}

/// Fill gaps in a freshly captured login from the previous cache
fn merge_login(login: AuthCache, cached: Option<&AuthCache>) -> AuthCache {
    let Some(prev) = cached else {
        return login;
    };
    AuthCache {
        token: login.token,
        refresh_token: login.refresh_token.or_else(|| prev.refresh_token.clone()),
        rpc_host: login.rpc_host.or_else(|| prev.rpc_host.clone()),
        patient_id: login.patient_id.or_else(|| prev.patient_id.clone()),
        pharmacy_id: login.pharmacy_id.or_else(|| prev.pharmacy_id.clone()),
        user_agent: login.user_agent.or_else(|| prev.user_agent.clone()),
    }
}
