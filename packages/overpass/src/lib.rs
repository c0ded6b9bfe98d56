#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Overpass API client for administrative boundary discovery.
//!
//! Three concerns live here: building Overpass QL query text ([`query`]),
//! walking the admin-level hierarchy for a country ([`discovery`]), and
//! fetching + assembling relation geometry ([`geometry`]).
//!
//! All requests go through the shared retry client; a retry-exhausted
//! request surfaces as [`OverpassError::Fetch`] and aborts the country's
//! current level — an incomplete level must never look complete downstream.

pub mod discovery;
pub mod geometry;
pub mod query;

use boundary_map_fetch::FetchError;
use boundary_map_fetch::retry::{self, RetryPolicy};
use boundary_map_overpass_models::OverpassResponse;

/// Default Overpass interpreter endpoint.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Errors from Overpass queries and boundary discovery.
#[derive(Debug, thiserror::Error)]
pub enum OverpassError {
    /// The HTTP request failed after all retries.
    #[error("Overpass request failed: {0}")]
    Fetch(#[from] FetchError),

    /// The response decoded as JSON but not as an Overpass payload.
    #[error("Overpass response parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// No admin level in the configured range produced any relations.
    #[error("no relations found for {iso3}")]
    NoRelations {
        /// ISO3 code of the country that came up empty.
        iso3: String,
    },
}

/// Client for the Overpass interpreter endpoint.
///
/// Queries are POSTed as plain text; responses are JSON. The client holds
/// the retry policy so tests can shrink the backoff to milliseconds.
pub struct OverpassClient {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl OverpassClient {
    /// Creates a client for the given interpreter URL.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the HTTP client fails to build.
    pub fn new(url: &str) -> Result<Self, OverpassError> {
        Ok(Self {
            client: boundary_map_fetch::build_http_client()?,
            url: url.to_string(),
            policy: RetryPolicy::default(),
        })
    }

    /// Creates a client from the `OVERPASS_URL` environment variable,
    /// falling back to the public interpreter.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the HTTP client fails to build.
    pub fn from_env() -> Result<Self, OverpassError> {
        let url =
            std::env::var("OVERPASS_URL").unwrap_or_else(|_| DEFAULT_OVERPASS_URL.to_string());
        Self::new(&url)
    }

    /// Overrides the retry policy (tests use a 1ms base delay).
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// POSTs a query to the interpreter and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the request fails after retries or the
    /// response is not an Overpass JSON payload.
    pub async fn run_query(&self, query_text: &str) -> Result<OverpassResponse, OverpassError> {
        let body = retry::send_json(&self.policy, || {
            self.client
                .post(&self.url)
                .header("Content-Type", "text/plain")
                .body(query_text.to_string())
        })
        .await?;

        Ok(serde_json::from_value(body)?)
    }

    /// Runs an ids-only query and returns the matched relation ids.
    ///
    /// # Errors
    ///
    /// Returns [`OverpassError`] if the request fails after retries.
    pub async fn run_ids_query(&self, query_text: &str) -> Result<Vec<i64>, OverpassError> {
        let response = self.run_query(query_text).await?;
        Ok(response
            .elements
            .iter()
            .filter(|e| e.is_relation())
            .map(|e| e.id)
            .collect())
    }
}
