//! Catalogue API HTTP client
//!
//! Provides the count and page endpoints the capture worker paginates over.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::time::Duration;

use serde_json::Value;
use url::Url;

use super::api::{CountResponse, PageResponse};
use crate::config::CaptureFilter;
use crate::models::AuthCache;

/// User agent sent when the auth cache doesn't carry one
const DEFAULT_USER_AGENT: &str = concat!("stockwatch/", env!("CARGO_PKG_VERSION"));

/// Errors from the fetch client, classified for the worker's retry logic
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The client can't work at all (missing runtime, bad setup). Fatal.
    #[error("fetch client unavailable: {0}")]
    Unavailable(String),
    /// The API rejected the credentials
    #[error("unauthorized (HTTP {0})")]
    Unauthorized(u16),
    /// Network trouble or a server-side error; worth retrying
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// The response body was not what the API contract promises
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether retrying within the same cycle can help
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transient(_) | FetchError::Unauthorized(_) | FetchError::Decode(_)
        )
    }
}

/// A paginated catalogue source
///
/// Injected into the worker at construction; tests substitute fakes.
pub trait FetchClient: Send + Sync {
    /// Check the client can run at all. Failing here faults the worker.
    fn ensure_ready(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Total number of records the listing reports
    fn count(&self, auth: &AuthCache, filter: &CaptureFilter) -> Result<usize, FetchError>;

    /// One page of raw records starting at `skip`
    fn page(
        &self,
        auth: &AuthCache,
        filter: &CaptureFilter,
        skip: usize,
        take: usize,
    ) -> Result<Vec<Value>, FetchError>;
}

/// Catalogue client speaking the JSON API at `{rpc_host}/products`
pub struct HttpFetchClient {
    agent: ureq::Agent,
}

impl HttpFetchClient {
    const TIMEOUT: Duration = Duration::from_secs(45);

    /// Create a new catalogue client
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Self::TIMEOUT))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    /// Build an endpoint URL with the standard identity and filter params
    fn endpoint(
        &self,
        auth: &AuthCache,
        path: &str,
        filter: &CaptureFilter,
    ) -> Result<Url, FetchError> {
        let host = auth
            .rpc_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| FetchError::Transient("no API host in auth cache".to_string()))?;

        let base = Url::parse(&format!("{}/", host.trim().trim_end_matches('/')))
            .map_err(|e| FetchError::Transient(format!("invalid API host {:?}: {}", host, e)))?;
        let mut url = base
            .join(path)
            .map_err(|e| FetchError::Transient(format!("invalid endpoint {:?}: {}", path, e)))?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(pharmacy) = auth.pharmacy_id.as_deref() {
                query.append_pair("pharmacyId", pharmacy);
            }
            if let Some(patient) = auth.patient_id.as_deref() {
                query.append_pair("patientId", patient);
            }
            for product_type in &filter.product_types {
                query.append_pair("type", product_type);
            }
            if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
                query.append_pair("search", search.trim());
            }
            if !filter.include_out_of_stock {
                query.append_pair("inStock", "true");
            }
        }
        Ok(url)
    }

    fn get_json(&self, auth: &AuthCache, url: &Url) -> Result<Value, FetchError> {
        let token = auth
            .bearer()
            .ok_or(FetchError::Unauthorized(401))?;
        let user_agent = auth.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);

        let response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &format!("Bearer {}", token))
            .header("User-Agent", user_agent)
            .header("Accept", "application/json")
            .call();

        match response {
            Ok(mut resp) => resp
                .body_mut()
                .read_json::<Value>()
                .map_err(|e| FetchError::Decode(format!("invalid JSON from {}: {}", url.path(), e))),
            Err(ureq::Error::StatusCode(code @ (401 | 403))) => Err(FetchError::Unauthorized(code)),
            Err(ureq::Error::StatusCode(code)) => {
                Err(FetchError::Transient(format!("HTTP {} from {}", code, url.path())))
            }
            Err(e) => Err(FetchError::Transient(e.to_string())),
        }
    }
}

impl Default for HttpFetchClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchClient for HttpFetchClient {
    fn count(&self, auth: &AuthCache, filter: &CaptureFilter) -> Result<usize, FetchError> {
        let url = self.endpoint(auth, "products/count", filter)?;
        let body = self.get_json(auth, &url)?;
        CountResponse::from_value(body)
            .map(|c| c.total)
            .ok_or_else(|| FetchError::Decode("count endpoint returned no total".to_string()))
    }

    fn page(
        &self,
        auth: &AuthCache,
        filter: &CaptureFilter,
        skip: usize,
        take: usize,
    ) -> Result<Vec<Value>, FetchError> {
        let mut url = self.endpoint(auth, "products", filter)?;
        url.query_pairs_mut()
            .append_pair("skip", &skip.to_string())
            .append_pair("take", &take.to_string());

        let body = self.get_json(auth, &url)?;
        PageResponse::from_value(body)
            .map(|p| p.records)
            .ok_or_else(|| FetchError::Decode("listing endpoint returned no records".to_string()))
    }
}
