//! Unverified JWT inspection
//!
//! The catalogue hands out bearer JWTs. Signatures are never checked here;
//! only the payload's `exp` claim is read to decide when to refresh.

use base64::prelude::*;
use chrono::{DateTime, Utc};

use super::auth::AuthError;

/// Decode the claims object of a JWT without verifying its signature
pub fn decode_claims(token: &str) -> Result<serde_json::Value, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AuthError::Decode("token is not a JWT".to_string()))?;

    let payload = payload.trim_end_matches('=');
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| BASE64_STANDARD_NO_PAD.decode(payload))
        .map_err(|e| AuthError::Decode(format!("invalid base64 payload: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Decode(format!("invalid claims JSON: {}", e)))
}

/// Read the `exp` claim as a UTC timestamp
///
/// Returns `Ok(None)` when the token decodes but carries no numeric `exp`.
pub fn token_expiry(token: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
    let claims = decode_claims(token)?;
    let exp = match claims.get("exp") {
        Some(v) => v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)),
        None => None,
    };
    Ok(exp.and_then(|secs| DateTime::from_timestamp(secs, 0)))
}

/// Whether a token should be treated as expired at `now`
///
/// Undecodable tokens count as expired so they get refreshed; tokens with no
/// `exp` claim never expire on their own.
pub fn is_token_expired(token: &str, now: DateTime<Utc>) -> bool {
    match token_expiry(token) {
        Ok(Some(exp)) => exp <= now,
        Ok(None) => false,
        Err(_) => true,
    }
}
