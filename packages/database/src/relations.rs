//! Raw boundary relation storage.
//!
//! One row per discovered OSM relation per country. Rows are upserted on
//! every run — re-importing a country refreshes its data in place.

use std::collections::BTreeMap;

use boundary_map_database_models::RawBoundaryRow;
use boundary_map_overpass_models::BoundaryRelation;
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;

/// Upserts a level's worth of assembled boundary relations.
///
/// On conflict with `(relation_id, country_code)` everything except the
/// surrogate id is overwritten and `fetched_at` refreshed, which is what
/// makes interrupted runs safe to restart from scratch.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails.
pub async fn upsert_relations(
    db: &dyn Database,
    country_code: &str,
    relations: &[BoundaryRelation],
) -> Result<u64, DbError> {
    let mut upserted = 0u64;

    for relation in relations {
        let tags = serde_json::to_string(&relation.tags).map_err(|e| DbError::Conversion {
            message: format!("Failed to serialize tags for relation {}: {e}", relation.relation_id),
        })?;

        let result = db
            .exec_raw_params(
                "INSERT INTO osm_boundary_relations
                     (relation_id, country_code, admin_level, name, wikidata_id, geometry, tags, fetched_at)
                 VALUES ($1, $2, $3, $4, $5, ST_GeomFromEWKT($6), $7::jsonb, NOW())
                 ON CONFLICT (relation_id, country_code) DO UPDATE SET
                     admin_level = EXCLUDED.admin_level,
                     name = EXCLUDED.name,
                     wikidata_id = EXCLUDED.wikidata_id,
                     geometry = EXCLUDED.geometry,
                     tags = EXCLUDED.tags,
                     fetched_at = NOW()",
                &[
                    DatabaseValue::Number(relation.relation_id),
                    DatabaseValue::String(country_code.to_string()),
                    DatabaseValue::Number(i64::from(relation.admin_level)),
                    DatabaseValue::String(relation.name.clone()),
                    relation
                        .wikidata_id
                        .clone()
                        .map_or(DatabaseValue::Null, DatabaseValue::String),
                    DatabaseValue::String(relation.geometry_ewkt.clone()),
                    DatabaseValue::String(tags),
                ],
            )
            .await?;

        upserted += result;
    }

    Ok(upserted)
}

/// Distinct wikidata ids stored for a country, for enrichment.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn wikidata_ids(db: &dyn Database, country_code: &str) -> Result<Vec<String>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT DISTINCT wikidata_id
             FROM osm_boundary_relations
             WHERE country_code = $1 AND wikidata_id IS NOT NULL",
            &[DatabaseValue::String(country_code.to_string())],
        )
        .await?;

    rows.iter()
        .map(|row| {
            row.to_value::<String>("wikidata_id")
                .map_err(|e| DbError::Conversion {
                    message: format!("Failed to read wikidata_id: {e}"),
                })
        })
        .collect()
}

/// Loads a country's raw rows for the transform stage, ordered by admin
/// level then name so deduplication keeps the coarsest boundary first.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn rows_for_transform(
    db: &dyn Database,
    country_code: &str,
) -> Result<Vec<RawBoundaryRow>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT relation_id, admin_level, name, wikidata_id,
                    ST_AsEWKT(geometry) AS geometry_ewkt
             FROM osm_boundary_relations
             WHERE country_code = $1
             ORDER BY admin_level ASC, name ASC",
            &[DatabaseValue::String(country_code.to_string())],
        )
        .await?;

    rows.iter()
        .map(|row| {
            let admin_level: i32 = row.to_value("admin_level").map_err(|e| DbError::Conversion {
                message: format!("Failed to read admin_level: {e}"),
            })?;
            let admin_level = u8::try_from(admin_level).map_err(|e| DbError::Conversion {
                message: format!("admin_level {admin_level} out of range: {e}"),
            })?;

            Ok(RawBoundaryRow {
                relation_id: row.to_value("relation_id").map_err(|e| DbError::Conversion {
                    message: format!("Failed to read relation_id: {e}"),
                })?,
                admin_level,
                name: row.to_value("name").map_err(|e| DbError::Conversion {
                    message: format!("Failed to read name: {e}"),
                })?,
                wikidata_id: row.to_value("wikidata_id").map_err(|e| DbError::Conversion {
                    message: format!("Failed to read wikidata_id: {e}"),
                })?,
                geometry_ewkt: row
                    .to_value("geometry_ewkt")
                    .map_err(|e| DbError::Conversion {
                        message: format!("Failed to read geometry_ewkt: {e}"),
                    })?,
            })
        })
        .collect()
}

/// Per-level relation counts for a country, for the verifier summary.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn level_counts(
    db: &dyn Database,
    country_code: &str,
) -> Result<BTreeMap<u8, i64>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT admin_level, COUNT(*) AS cnt
             FROM osm_boundary_relations
             WHERE country_code = $1
             GROUP BY admin_level
             ORDER BY admin_level",
            &[DatabaseValue::String(country_code.to_string())],
        )
        .await?;

    let mut counts = BTreeMap::new();
    for row in &rows {
        let level: i32 = row.to_value("admin_level").map_err(|e| DbError::Conversion {
            message: format!("Failed to read admin_level: {e}"),
        })?;
        let level = u8::try_from(level).map_err(|e| DbError::Conversion {
            message: format!("admin_level {level} out of range: {e}"),
        })?;
        let count: i64 = row.to_value("cnt").map_err(|e| DbError::Conversion {
            message: format!("Failed to read count: {e}"),
        })?;
        counts.insert(level, count);
    }

    Ok(counts)
}
