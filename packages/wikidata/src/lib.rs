#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batched Wikidata entity client.
//!
//! Looks up the Commons category (property `P373`) for a set of wikidata
//! ids via the `wbgetentities` API, 50 ids per request. Enrichment is
//! best-effort by design: a failed batch is logged and contributes nothing,
//! because partial enrichment is worth far more than failing a whole
//! country import over a Wikidata outage.
//!
//! Wikidata ids keep their `Q` prefix end-to-end — the prefix is part of
//! the identifier, never notation to strip.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use boundary_map_fetch::FetchError;
use boundary_map_fetch::retry::{self, RetryPolicy};

/// Default Wikidata API endpoint.
pub const DEFAULT_WIKIDATA_API_URL: &str = "https://www.wikidata.org/w/api.php";

/// Ids per `wbgetentities` request (the API's own ceiling for anonymous
/// clients).
pub const WIKIDATA_BATCH_SIZE: usize = 50;

/// Pause between entity batches.
pub const WIKIDATA_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Errors from the Wikidata client.
///
/// These only surface from client construction; lookup failures degrade to
/// empty batch results instead.
#[derive(Debug, thiserror::Error)]
pub enum WikidataError {
    /// The HTTP client failed to build.
    #[error("Wikidata client error: {0}")]
    Fetch(#[from] FetchError),
}

/// Client for the Wikidata `wbgetentities` endpoint.
pub struct WikidataClient {
    client: reqwest::Client,
    api_url: String,
    policy: RetryPolicy,
}

impl WikidataClient {
    /// Creates a client for the given `api.php` URL.
    ///
    /// # Errors
    ///
    /// Returns [`WikidataError`] if the HTTP client fails to build.
    pub fn new(api_url: &str) -> Result<Self, WikidataError> {
        Ok(Self {
            client: boundary_map_fetch::build_http_client()?,
            api_url: api_url.to_string(),
            policy: RetryPolicy::default(),
        })
    }

    /// Creates a client from the `WIKIDATA_API_URL` environment variable,
    /// falling back to the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`WikidataError`] if the HTTP client fails to build.
    pub fn from_env() -> Result<Self, WikidataError> {
        let url = std::env::var("WIKIDATA_API_URL")
            .unwrap_or_else(|_| DEFAULT_WIKIDATA_API_URL.to_string());
        Self::new(&url)
    }

    /// Overrides the retry policy (tests use a 1ms base delay).
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetches Commons categories for the given wikidata ids.
    ///
    /// Ids are deduplicated and split into batches of
    /// [`WIKIDATA_BATCH_SIZE`], with a [`WIKIDATA_BATCH_DELAY`] sleep
    /// between batches. The returned map is partial: ids that are missing
    /// upstream, have no `P373` claim, or sat in a failed batch are simply
    /// absent (downstream drops those records).
    pub async fn fetch_commons_categories(&self, ids: &[String]) -> BTreeMap<String, String> {
        let unique: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let unique: Vec<&str> = unique.into_iter().collect();

        let mut categories = BTreeMap::new();

        for (batch_index, batch) in unique.chunks(WIKIDATA_BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(WIKIDATA_BATCH_DELAY).await;
            }

            let ids_param = batch.join("|");
            let result = retry::send_json(&self.policy, || {
                self.client.get(&self.api_url).query(&[
                    ("action", "wbgetentities"),
                    ("format", "json"),
                    ("formatversion", "2"),
                    ("ids", ids_param.as_str()),
                    ("props", "claims"),
                ])
            })
            .await;

            match result {
                Ok(body) => {
                    let found = extract_commons_categories(&body);
                    log::debug!(
                        "wikidata batch {}: {} of {} ids have a Commons category",
                        batch_index + 1,
                        found.len(),
                        batch.len()
                    );
                    categories.extend(found);
                }
                Err(e) => {
                    // Absorb the failure: enrichment continues with what
                    // the other batches return.
                    log::warn!(
                        "wikidata batch {} failed ({} ids): {e}",
                        batch_index + 1,
                        batch.len()
                    );
                }
            }
        }

        categories
    }
}

/// Extracts `id -> P373 Commons category` from a `wbgetentities` response.
///
/// Entities flagged `missing` or without a `P373` claim are skipped.
#[must_use]
pub fn extract_commons_categories(body: &serde_json::Value) -> BTreeMap<String, String> {
    let mut categories = BTreeMap::new();

    let Some(entities) = body.get("entities").and_then(serde_json::Value::as_object) else {
        return categories;
    };

    for (id, entity) in entities {
        if entity.get("missing").is_some() {
            continue;
        }

        let category = entity
            .get("claims")
            .and_then(|claims| claims.get("P373"))
            .and_then(|claim| claim.get(0))
            .and_then(|first| first.get("mainsnak"))
            .and_then(|snak| snak.get("datavalue"))
            .and_then(|dv| dv.get("value"))
            .and_then(serde_json::Value::as_str);

        if let Some(category) = category {
            categories.insert(id.clone(), category.to_string());
        }
    }

    categories
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_p373_values_keyed_by_q_id() {
        let body = json!({
            "entities": {
                "Q239": {
                    "claims": {
                        "P373": [
                            {"mainsnak": {"datavalue": {"value": "Brussels"}}}
                        ]
                    }
                },
                "Q12994": {
                    "claims": {
                        "P373": [
                            {"mainsnak": {"datavalue": {"value": "Antwerp"}}}
                        ]
                    }
                }
            }
        });

        let categories = extract_commons_categories(&body);
        assert_eq!(categories.len(), 2);
        assert_eq!(categories["Q239"], "Brussels");
        assert_eq!(categories["Q12994"], "Antwerp");
    }

    #[test]
    fn skips_missing_entities_and_entities_without_p373() {
        let body = json!({
            "entities": {
                "Q1": {"missing": ""},
                "Q2": {"claims": {}},
                "Q3": {
                    "claims": {
                        "P373": [
                            {"mainsnak": {"datavalue": {"value": "Kept"}}}
                        ]
                    }
                }
            }
        });

        let categories = extract_commons_categories(&body);
        assert_eq!(categories.len(), 1);
        assert_eq!(categories["Q3"], "Kept");
    }

    #[test]
    fn tolerates_a_malformed_payload() {
        assert!(extract_commons_categories(&json!({"error": "nope"})).is_empty());
        assert!(extract_commons_categories(&json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn keys_preserve_the_q_prefix() {
        let body = json!({
            "entities": {
                "Q42": {
                    "claims": {
                        "P373": [
                            {"mainsnak": {"datavalue": {"value": "Douglas Adams"}}}
                        ]
                    }
                }
            }
        });

        let categories = extract_commons_categories(&body);
        assert!(categories.keys().all(|k| k.starts_with('Q')));
    }
}
