//! Pharmacy catalogue integration
//!
//! This module provides:
//! - Token lifecycle (validation, refresh, interactive bootstrap)
//! - Paginated catalogue client
//! - Raw record normalization to domain models

mod auth;
mod client;
mod normalize;
pub mod token;

pub use auth::{
    AuthError, AuthStatus, Authenticator, BOOTSTRAP_BACKOFF_SECS, BOOTSTRAP_FAILURE_THRESHOLD,
    HttpTokenRefresher, TokenRefresher,
};
pub use client::{FetchClient, FetchError, HttpFetchClient};
pub use normalize::{ItemParser, JsonItemParser, ParseError, normalize_record};

/// Catalogue API response shapes
pub mod api {
    use serde_json::Value;

    /// Response from the count endpoint
    ///
    /// Accepts a bare number or an object with `count`, `total` or
    /// `totalCount`; numeric strings are tolerated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CountResponse {
        pub total: usize,
    }

    impl CountResponse {
        pub fn from_value(value: Value) -> Option<Self> {
            let raw = match &value {
                Value::Object(map) => ["count", "total", "totalCount"]
                    .iter()
                    .find_map(|k| map.get(*k))?,
                other => other,
            };
            let total = match raw {
                Value::Number(n) => n.as_u64().or_else(|| {
                    n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)
                })?,
                Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            Some(Self {
                total: total as usize,
            })
        }
    }

    /// Response from the listing endpoint
    ///
    /// Accepts a bare array or an object wrapping it in `items`, `data`,
    /// `products` or `results`.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PageResponse {
        pub records: Vec<Value>,
    }

    impl PageResponse {
        pub fn from_value(value: Value) -> Option<Self> {
            let records = match value {
                Value::Array(records) => records,
                Value::Object(mut map) => ["items", "data", "products", "results"]
                    .iter()
                    .find_map(|k| match map.remove(*k) {
                        Some(Value::Array(records)) => Some(records),
                        _ => None,
                    })?,
                _ => return None,
            };
            Some(Self { records })
        }
    }

}
