//! Cached credentials for the catalogue API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::token;

/// Persisted authentication record
///
/// Written after every successful refresh or interactive login and read at
/// the start of every capture cycle. Any field may be missing; a record
/// without a usable token forces a refresh or a new login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthCache {
    /// Bearer JWT for API calls
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Base URL of the catalogue API (e.g. "https://rpc.example.com")
    #[serde(default)]
    pub rpc_host: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub pharmacy_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl AuthCache {
    /// Create a record holding just a token and API host
    pub fn new(token: impl Into<String>, rpc_host: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            rpc_host: Some(rpc_host.into()),
            ..Self::default()
        }
    }

    /// The bearer token, if present and non-blank
    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// The refresh token, if present and non-blank
    pub fn refresh(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Expiry of the bearer token, read from its unverified `exp` claim
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.bearer().and_then(|t| token::token_expiry(t).ok().flatten())
    }

    /// Whether the bearer token is present and not expired at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.bearer() {
            Some(t) => !token::is_token_expired(t, now),
            None => false,
        }
    }

    /// Replace the tokens with a refreshed pair, keeping everything else
    pub fn with_tokens(mut self, token: String, refresh_token: Option<String>) -> Self {
        self.token = Some(token);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self
    }
}
