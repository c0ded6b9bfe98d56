#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared HTTP plumbing for the boundary map fetchers.
//!
//! Both upstream services (the Overpass interpreter and the Wikidata entity
//! endpoint) are rate limited and occasionally flaky, so every request goes
//! through [`retry::send_json`] instead of calling
//! `reqwest::RequestBuilder::send()` directly.
//!
//! This crate deliberately does not log: callers decide whether a failed
//! request is fatal (Overpass geometry batches) or absorbable (Wikidata
//! enrichment batches) and log accordingly.

pub mod progress;
pub mod retry;

/// Errors that can occur while fetching from an upstream API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP transport failed (connect, timeout, reset) after all retries.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} {status_text}")]
    Status {
        /// Numeric status code (e.g. 429, 503).
        status: u16,
        /// Canonical reason phrase, when one exists (empty otherwise).
        status_text: String,
    },

    /// The response body was not valid JSON.
    #[error("JSON decode error: {0}")]
    Decode(#[source] reqwest::Error),
}

impl FetchError {
    /// Builds a [`FetchError::Status`] from a `reqwest` status code.
    #[must_use]
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        Self::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
        }
    }
}

/// Builds the shared `reqwest` client with the project user-agent.
///
/// The Wikimedia APIs require a descriptive user-agent that identifies the
/// tool and a way to reach its operator; Overpass tolerates the same one.
///
/// # Errors
///
/// Returns [`FetchError`] if the TLS backend fails to initialize.
pub fn build_http_client() -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// User-agent sent with every upstream request.
pub const USER_AGENT: &str =
    "boundary-map/1.0 (administrative boundary importer; +https://github.com/BSteffaniak/boundary-map)";
