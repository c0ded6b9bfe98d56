//! Post-import verification queries.
//!
//! After a country's pipeline finishes, the verifier re-reads the store
//! and reports what actually landed: raw relation counts per admin level,
//! enriched rows with a null field, and enriched rows whose geometry
//! `PostGIS` considers invalid. The checks are observational — failures
//! show up in the operator summary rather than aborting anything.

use std::collections::BTreeMap;

use boundary_map_database::{DbError, relations};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

/// Verifier output for one country.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Raw relation counts keyed by admin level.
    pub level_counts: BTreeMap<u8, i64>,
    /// Enriched rows (for this country's wikidata ids) with any null
    /// field. Should be zero — the columns are NOT NULL — but the check
    /// stays as a canary.
    pub null_field_rows: i64,
    /// Enriched rows whose geometry fails `ST_IsValid`.
    pub invalid_geometry_rows: i64,
}

impl VerifyReport {
    /// Whether the verifier found anything wrong.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.null_field_rows == 0 && self.invalid_geometry_rows == 0
    }
}

/// Runs the verification queries for one country.
///
/// # Errors
///
/// Returns [`DbError`] if a query fails.
pub async fn verify_country(db: &dyn Database, country_code: &str) -> Result<VerifyReport, DbError> {
    let level_counts = relations::level_counts(db, country_code).await?;

    let null_field_rows = count_enriched(
        db,
        country_code,
        "(e.commons_category IS NULL OR e.admin_level IS NULL
          OR e.name IS NULL OR e.geom IS NULL)",
    )
    .await?;

    let invalid_geometry_rows = count_enriched(db, country_code, "NOT ST_IsValid(e.geom)").await?;

    Ok(VerifyReport {
        level_counts,
        null_field_rows,
        invalid_geometry_rows,
    })
}

/// Counts enriched rows belonging to the country that match `predicate`.
async fn count_enriched(
    db: &dyn Database,
    country_code: &str,
    predicate: &str,
) -> Result<i64, DbError> {
    let sql = format!(
        "SELECT COUNT(*) AS cnt
         FROM enriched_boundaries e
         WHERE e.wikidata_id IN (
             SELECT wikidata_id FROM osm_boundary_relations
             WHERE country_code = $1 AND wikidata_id IS NOT NULL
         )
         AND {predicate}"
    );

    let rows = db
        .query_raw_params(&sql, &[DatabaseValue::String(country_code.to_string())])
        .await?;

    let row = rows.first().ok_or_else(|| DbError::Conversion {
        message: "COUNT(*) returned no rows".to_string(),
    })?;

    row.to_value("cnt").map_err(|e| DbError::Conversion {
        message: format!("Failed to read count: {e}"),
    })
}
