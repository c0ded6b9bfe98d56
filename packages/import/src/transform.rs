//! Transform raw boundary rows into enriched records.
//!
//! Runs after geometry is persisted and Commons categories are fetched.
//! Rows are dropped (never fatally) for four reasons, each with its own
//! counter: no wikidata id, no Commons category, invalid geometry, or a
//! duplicate wikidata id. Input arrives ordered by admin level then name,
//! so deduplication keeps the coarsest boundary for each wikidata id.

use std::collections::{BTreeMap, BTreeSet};

use boundary_map_database_models::{EnrichedRecord, RawBoundaryRow};
use boundary_map_spatial::validate_ewkt;

/// Drop counters from one transform pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Records that survived every check.
    pub accepted: u64,
    /// Rows with no wikidata id.
    pub missing_wikidata: u64,
    /// Rows whose wikidata id has no known Commons category.
    pub missing_category: u64,
    /// Rows whose stored geometry failed validation (including the
    /// empty-polygon placeholder).
    pub invalid_geometry: u64,
    /// Rows sharing a wikidata id with an earlier row.
    pub duplicates: u64,
}

/// Joins raw rows with the category map, validates, and deduplicates.
#[must_use]
pub fn transform_rows(
    rows: Vec<RawBoundaryRow>,
    categories: &BTreeMap<String, String>,
) -> (Vec<EnrichedRecord>, TransformStats) {
    let mut stats = TransformStats::default();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut records = Vec::new();

    for row in rows {
        let Some(wikidata_id) = row.wikidata_id else {
            stats.missing_wikidata += 1;
            continue;
        };

        let Some(category) = categories.get(&wikidata_id) else {
            stats.missing_category += 1;
            continue;
        };

        let Some(geometry) = row.geometry_ewkt.filter(|g| validate_ewkt(g)) else {
            stats.invalid_geometry += 1;
            continue;
        };

        if !seen.insert(wikidata_id.clone()) {
            stats.duplicates += 1;
            continue;
        }

        stats.accepted += 1;
        records.push(EnrichedRecord {
            wikidata_id,
            commons_category: category.clone(),
            admin_level: row.admin_level,
            name: row.name,
            geom_ewkt: geometry,
        });
    }

    (records, stats)
}
