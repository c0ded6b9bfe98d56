#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row types shared between the database layer and the import pipeline.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Per-country import state, stored as text in `import_progress.status`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CountryStatus {
    /// Never imported (or explicitly reset).
    Pending,
    /// An import run owns this country right now — or a prior run was
    /// interrupted, in which case the next run starts over from scratch.
    InProgress,
    /// The full pipeline finished; `completed_at` is set.
    Completed,
    /// The pipeline aborted; `last_error` holds the one-line reason.
    Failed,
}

/// One row of the `import_progress` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProgress {
    /// ISO 3166-1 alpha-3 country code.
    pub country_code: String,
    /// Last admin level attempted.
    pub current_admin_level: u8,
    /// Import state machine position.
    pub status: CountryStatus,
    /// Cumulative relations fetched across levels.
    pub relations_fetched: i64,
    /// Cumulative non-fatal error count.
    pub errors: i64,
    /// When the current (or last) run started, as database text.
    pub started_at: Option<String>,
    /// When the run completed; `None` unless terminal.
    pub completed_at: Option<String>,
    /// One-line failure reason; `None` unless `status` is failed.
    pub last_error: Option<String>,
}

/// A raw boundary row read back for the transform stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBoundaryRow {
    /// OSM relation id.
    pub relation_id: i64,
    /// Administrative level.
    pub admin_level: u8,
    /// Boundary name.
    pub name: String,
    /// Wikidata id (`Q…`), when the relation carried one.
    pub wikidata_id: Option<String>,
    /// Stored geometry as EWKT, when geometry exists.
    pub geometry_ewkt: Option<String>,
}

/// A validated record ready for the enriched boundaries table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    /// Wikidata id, unique in the enriched table.
    pub wikidata_id: String,
    /// Commons category from property `P373`.
    pub commons_category: String,
    /// Administrative level.
    pub admin_level: u8,
    /// Boundary name.
    pub name: String,
    /// Geometry as EWKT, already validated.
    pub geom_ewkt: String,
}

/// A captured per-row persistence failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowInsertError {
    /// Name of the record that failed.
    pub record_name: String,
    /// The database error text.
    pub error: String,
}

/// Aggregate result of a batched enriched-table upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertStats {
    /// Rows successfully upserted and committed.
    pub inserted: u64,
    /// Per-row failures, in encounter order.
    pub errors: Vec<RowInsertError>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn status_round_trips_through_its_text_form() {
        for status in [
            CountryStatus::Pending,
            CountryStatus::InProgress,
            CountryStatus::Completed,
            CountryStatus::Failed,
        ] {
            let text = status.to_string();
            assert_eq!(CountryStatus::from_str(&text).unwrap(), status);
        }
    }

    #[test]
    fn status_text_matches_the_schema_enum() {
        assert_eq!(CountryStatus::Pending.to_string(), "pending");
        assert_eq!(CountryStatus::InProgress.to_string(), "in_progress");
        assert_eq!(CountryStatus::Completed.to_string(), "completed");
        assert_eq!(CountryStatus::Failed.to_string(), "failed");
    }
}
