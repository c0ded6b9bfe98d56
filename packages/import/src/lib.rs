#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Country import orchestration.
//!
//! A single country runs as a strict sequence: discovery walks the admin
//! levels, each level's geometry is assembled and upserted into the raw
//! table before the next level starts, then the stored rows are enriched
//! with Commons categories, transformed, persisted to the enriched table,
//! and verified. The tracker row moves `in_progress -> completed|failed`
//! around that sequence.
//!
//! Multi-country mode drains the catalogue in concurrent batches of
//! [`COUNTRY_BATCH_SIZE`]. The pipelines share nothing but the connection
//! pool and the progress table, so one country's failure never touches
//! the others.

pub mod countries;
pub mod transform;
pub mod verify;

use std::sync::Arc;
use std::time::Duration;

use boundary_map_database::{DbError, boundaries, progress as progress_store, relations};
use boundary_map_database_models::RowInsertError;
use boundary_map_fetch::progress::ProgressCallback;
use boundary_map_overpass::{OverpassClient, OverpassError, discovery, geometry};
use boundary_map_wikidata::{WikidataClient, WikidataError};
use switchy_database::Database;

use crate::transform::TransformStats;
use crate::verify::VerifyReport;

/// Countries imported concurrently in multi-country mode.
pub const COUNTRY_BATCH_SIZE: usize = 5;

/// Pause between multi-country batches.
pub const COUNTRY_BATCH_DELAY: Duration = Duration::from_millis(5000);

/// Default admin-level range when none is configured.
pub const DEFAULT_MIN_LEVEL: u8 = 4;
/// See [`DEFAULT_MIN_LEVEL`].
pub const DEFAULT_MAX_LEVEL: u8 = 11;

/// Errors that abort a country's import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Overpass discovery or geometry fetch failed.
    #[error(transparent)]
    Overpass(#[from] OverpassError),

    /// Database operation failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The Wikidata client could not be constructed.
    #[error(transparent)]
    Wikidata(#[from] WikidataError),

    /// The configured admin-level range is unusable.
    #[error("invalid admin level range {min}-{max} (levels must be 2-11 and min <= max)")]
    InvalidLevelRange {
        /// Configured minimum level.
        min: u8,
        /// Configured maximum level.
        max: u8,
    },
}

/// Configuration for one country's import.
#[derive(Debug, Clone)]
pub struct ImportArgs {
    /// ISO 3166-1 alpha-3 code.
    pub country_code: String,
    /// First admin level to discover.
    pub min_level: u8,
    /// Last admin level to discover.
    pub max_level: u8,
}

impl ImportArgs {
    /// Checks the admin-level range against the 2-11 domain.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::InvalidLevelRange`] when out of domain.
    pub const fn validate(&self) -> Result<(), ImportError> {
        if self.min_level < 2
            || self.max_level > 11
            || self.min_level > self.max_level
        {
            return Err(ImportError::InvalidLevelRange {
                min: self.min_level,
                max: self.max_level,
            });
        }
        Ok(())
    }
}

/// The operator-facing report for one country's import.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    /// ISO3 code this summary describes.
    pub country_code: String,
    /// Unique relations discovered across all levels.
    pub relations_discovered: u64,
    /// Relations that parsed into persistable records.
    pub geometries_parsed: u64,
    /// Wikidata ids sent for enrichment.
    pub wikidata_requested: u64,
    /// Wikidata ids that came back with a Commons category.
    pub wikidata_matched: u64,
    /// Transform drop counters.
    pub transform: TransformStats,
    /// Rows upserted into the enriched table.
    pub inserted: u64,
    /// Per-row persistence failures.
    pub insert_errors: Vec<RowInsertError>,
    /// Post-import verification results.
    pub verification: VerifyReport,
}

impl ImportSummary {
    /// Whether the import completed with errors (non-zero exit).
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.insert_errors.is_empty() || !self.verification.is_clean()
    }

    /// Prints the per-country report.
    pub fn print(&self) {
        println!("\n=== Import summary: {} ===\n", self.country_code);
        println!("Relations discovered:  {}", self.relations_discovered);
        println!("Geometries parsed:     {}", self.geometries_parsed);
        println!(
            "Wikidata matches:      {} / {}",
            self.wikidata_matched, self.wikidata_requested
        );
        println!("Transforms accepted:   {}", self.transform.accepted);
        println!(
            "  dropped: {} no wikidata, {} no category, {} invalid geometry, {} duplicates",
            self.transform.missing_wikidata,
            self.transform.missing_category,
            self.transform.invalid_geometry,
            self.transform.duplicates
        );
        println!("Rows inserted:         {}", self.inserted);

        println!("Per-level counts:");
        for (level, count) in &self.verification.level_counts {
            println!("  level {level:>2}: {count}");
        }
        println!("Null-field rows:       {}", self.verification.null_field_rows);
        println!(
            "Invalid-geometry rows: {}",
            self.verification.invalid_geometry_rows
        );

        if !self.insert_errors.is_empty() {
            println!("Row errors ({} total, first 10):", self.insert_errors.len());
            for error in self.insert_errors.iter().take(10) {
                println!("  {}: {}", error.record_name, error.error);
            }
        }
    }
}

/// Runs the full pipeline for one country and updates its tracker row.
///
/// # Errors
///
/// Returns [`ImportError`] if the range is invalid or a stage aborts the
/// country; the tracker row is marked `failed` with the reason first.
pub async fn run_country(
    db: &dyn Database,
    overpass: &OverpassClient,
    wikidata: &WikidataClient,
    args: ImportArgs,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<ImportSummary, ImportError> {
    args.validate()?;

    progress_store::start_import(db, &args.country_code, args.min_level).await?;

    match import_country(db, overpass, wikidata, &args, progress).await {
        Ok(summary) => {
            progress_store::mark_completed(db, &args.country_code).await?;
            summary.print();
            Ok(summary)
        }
        Err(e) => {
            if let Err(mark_err) =
                progress_store::mark_failed(db, &args.country_code, &e.to_string()).await
            {
                log::error!(
                    "{}: failed to record import failure: {mark_err}",
                    args.country_code
                );
            }
            Err(e)
        }
    }
}

/// The pipeline body, separated so [`run_country`] can translate any
/// error into a `failed` tracker row.
async fn import_country(
    db: &dyn Database,
    overpass: &OverpassClient,
    wikidata: &WikidataClient,
    args: &ImportArgs,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<ImportSummary, ImportError> {
    let iso3 = args.country_code.as_str();

    // ── Discovery ────────────────────────────────────────────────────
    progress.set_message(format!("{iso3}: discovering boundary relations"));
    let levels = discovery::discover_levels(overpass, iso3, args.min_level, args.max_level).await?;

    let relations_discovered: u64 = levels.values().map(|ids| ids.len() as u64).sum();
    progress.set_total(relations_discovered);
    log::info!(
        "{iso3}: {relations_discovered} relations across {} levels",
        levels.len()
    );

    // ── Geometry + raw persistence, level by level ───────────────────
    let mut geometries_parsed = 0u64;

    for (level, ids) in &levels {
        progress.set_message(format!("{iso3}: fetching geometry for level {level}"));
        let ids: Vec<i64> = ids.iter().copied().collect();
        let parsed = geometry::fetch_level_geometries(overpass, &ids, progress).await?;
        geometries_parsed += parsed.len() as u64;

        relations::upsert_relations(db, iso3, &parsed).await?;
        progress_store::record_level(db, iso3, *level, ids.len() as u64).await?;
        log::info!(
            "{iso3}: level {level} persisted ({} of {} relations parsed)",
            parsed.len(),
            ids.len()
        );
    }

    // ── Enrichment ───────────────────────────────────────────────────
    progress.set_message(format!("{iso3}: fetching Commons categories"));
    let wikidata_ids = relations::wikidata_ids(db, iso3).await?;
    let categories = wikidata.fetch_commons_categories(&wikidata_ids).await;
    log::info!(
        "{iso3}: {} of {} wikidata ids have a Commons category",
        categories.len(),
        wikidata_ids.len()
    );

    // ── Transform + enriched persistence ─────────────────────────────
    let rows = relations::rows_for_transform(db, iso3).await?;
    let (records, transform_stats) = transform::transform_rows(rows, &categories);

    progress.set_message(format!("{iso3}: persisting {} enriched rows", records.len()));
    let insert_stats = boundaries::upsert_enriched(db, &records).await?;

    if !insert_stats.errors.is_empty() {
        progress_store::add_errors(db, iso3, insert_stats.errors.len() as u64).await?;
    }

    // ── Verification ─────────────────────────────────────────────────
    let verification = verify::verify_country(db, iso3).await?;

    progress.finish(format!(
        "{iso3}: {} enriched rows persisted",
        insert_stats.inserted
    ));

    Ok(ImportSummary {
        country_code: args.country_code.clone(),
        relations_discovered,
        geometries_parsed,
        wikidata_requested: wikidata_ids.len() as u64,
        wikidata_matched: categories.len() as u64,
        transform: transform_stats,
        inserted: insert_stats.inserted,
        insert_errors: insert_stats.errors,
        verification,
    })
}

/// Outcome of a multi-country run.
#[derive(Debug, Default)]
pub struct MultiImportResult {
    /// Summaries for countries that completed.
    pub completed: Vec<ImportSummary>,
    /// ISO3 codes of countries whose import failed.
    pub failed: Vec<String>,
}

/// Imports every catalogue country not already `completed`.
///
/// Countries run in concurrent batches of [`COUNTRY_BATCH_SIZE`] with a
/// [`COUNTRY_BATCH_DELAY`] pause between batches. Pipelines in a batch
/// share only the connection pool and the progress table; a failure is
/// recorded and the rest of the batch carries on.
///
/// # Errors
///
/// Returns [`ImportError`] only if the completed-country lookup fails;
/// individual country failures land in [`MultiImportResult::failed`].
pub async fn run_all(
    db: &dyn Database,
    overpass: &OverpassClient,
    wikidata: &WikidataClient,
    min_level: u8,
    max_level: u8,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<MultiImportResult, ImportError> {
    let completed = progress_store::completed_countries(db).await?;
    let pending: Vec<&str> = countries::COUNTRY_CODES
        .iter()
        .copied()
        .filter(|code| !completed.contains(*code))
        .collect();

    log::info!(
        "{} of {} catalogue countries pending import",
        pending.len(),
        countries::COUNTRY_CODES.len()
    );

    let mut result = MultiImportResult::default();

    for (batch_index, batch) in pending.chunks(COUNTRY_BATCH_SIZE).enumerate() {
        if batch_index > 0 {
            tokio::time::sleep(COUNTRY_BATCH_DELAY).await;
        }

        let imports = batch.iter().map(|code| {
            let args = ImportArgs {
                country_code: (*code).to_string(),
                min_level,
                max_level,
            };
            run_country(db, overpass, wikidata, args, progress)
        });

        let outcomes = futures::future::join_all(imports).await;

        for (code, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(summary) => result.completed.push(summary),
                Err(e) => {
                    log::error!("{code}: import failed: {e}");
                    result.failed.push((*code).to_string());
                }
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_range_validation() {
        let ok = ImportArgs {
            country_code: "BEL".to_string(),
            min_level: 4,
            max_level: 11,
        };
        assert!(ok.validate().is_ok());

        let too_low = ImportArgs {
            country_code: "BEL".to_string(),
            min_level: 1,
            max_level: 8,
        };
        assert!(matches!(
            too_low.validate(),
            Err(ImportError::InvalidLevelRange { .. })
        ));

        let too_high = ImportArgs {
            country_code: "BEL".to_string(),
            min_level: 4,
            max_level: 12,
        };
        assert!(too_high.validate().is_err());

        let inverted = ImportArgs {
            country_code: "BEL".to_string(),
            min_level: 8,
            max_level: 4,
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn summary_error_detection() {
        let clean = ImportSummary {
            country_code: "BEL".to_string(),
            relations_discovered: 10,
            geometries_parsed: 10,
            wikidata_requested: 10,
            wikidata_matched: 10,
            transform: TransformStats::default(),
            inserted: 10,
            insert_errors: Vec::new(),
            verification: VerifyReport::default(),
        };
        assert!(!clean.has_errors());

        let mut with_row_errors = clean.clone();
        with_row_errors.insert_errors.push(RowInsertError {
            record_name: "Brussels".to_string(),
            error: "boom".to_string(),
        });
        assert!(with_row_errors.has_errors());

        let mut with_invalid_geometry = clean;
        with_invalid_geometry.verification.invalid_geometry_rows = 1;
        assert!(with_invalid_geometry.has_errors());
    }
}
