//! Request-with-retry against a JSON-response endpoint.
//!
//! All upstream fetchers should use [`send_json`] instead of calling
//! `reqwest::RequestBuilder::send()` directly. This ensures every HTTP
//! request gets automatic retry with exponential backoff for transient
//! failures (timeouts, connection resets, server overload, rate limiting).
//!
//! # Usage
//!
//! ```ignore
//! use boundary_map_fetch::retry::{self, RetryPolicy};
//!
//! // POST an Overpass query
//! let body = retry::send_json(&RetryPolicy::default(), || {
//!     client.post(url).body(query.clone())
//! })
//! .await?;
//!
//! // GET with query params
//! let body = retry::send_json(&RetryPolicy::default(), || {
//!     client.get(url).query(&params)
//! })
//! .await?;
//! ```

use std::time::Duration;

use crate::FetchError;

/// Maximum number of HTTP calls for a single logical request.
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay before the second attempt; doubles for each further attempt.
pub const BASE_DELAY: Duration = Duration::from_millis(1000);

/// Retry schedule for [`send_json`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (so `3` means at most two
    /// retries).
    pub max_attempts: u32,
    /// Delay before the second attempt. The delay before attempt `n` is
    /// `base_delay * 2^(n-2)`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the given 1-indexed attempt.
    ///
    /// Attempt 1 has no delay; attempt `n >= 2` waits
    /// `base_delay * 2^(n-2)`.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            Duration::ZERO
        } else {
            self.base_delay * 2u32.saturating_pow(attempt - 2)
        }
    }
}

/// Returns `true` for statuses worth retrying: 429 plus the overload 5xx
/// family. 501 is deliberately excluded — the server is telling us the
/// request shape itself is unsupported.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
/// This allows retrying any request shape — POST with a text body, GET with
/// query params, custom headers.
///
/// # Retry behaviour
///
/// Up to `policy.max_attempts` total HTTP calls, with exponential backoff
/// between them, on:
/// - transport errors (connect, timeout, reset)
/// - HTTP 429 (Too Many Requests)
/// - HTTP 500, 502, 503, 504
///
/// Does **not** retry other non-2xx statuses (permanent) or a JSON decode
/// failure after a successful response (the payload will not improve).
///
/// This function never logs; callers decide how loud a failure should be.
///
/// # Errors
///
/// Returns [`FetchError`] with the last status or transport cause once the
/// attempt budget is exhausted, or immediately for terminal conditions.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, FetchError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if attempt < policy.max_attempts {
                    continue;
                }
                return Err(FetchError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(FetchError::Decode);
                }

                if is_retryable_status(status.as_u16()) && attempt < policy.max_attempts {
                    continue;
                }

                return Err(FetchError::from_status(status));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_respects_configured_base() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        assert_eq!(policy.delay_before(2), Duration::from_millis(1));
        assert_eq!(policy.delay_before(3), Duration::from_millis(2));
        assert_eq!(policy.delay_before(4), Duration::from_millis(4));
    }

    #[test]
    fn rate_limit_and_overload_are_retryable() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(502));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(504));
    }

    #[test]
    fn client_errors_are_terminal() {
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(501));
    }
}
