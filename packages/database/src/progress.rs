//! Per-country import progress tracking.
//!
//! A small state machine persisted in `import_progress`:
//! `pending -> in_progress -> completed | failed`. Starting an import
//! (re)initialises the row unconditionally — an interrupted run's
//! `in_progress` row is reset and the work redone, relying on the raw
//! table's idempotent upserts.

use std::collections::BTreeSet;
use std::str::FromStr as _;

use boundary_map_database_models::{CountryStatus, ImportProgress};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;

/// Marks a country `in_progress` and resets its counters.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn start_import(
    db: &dyn Database,
    country_code: &str,
    min_level: u8,
) -> Result<(), DbError> {
    db.exec_raw_params(
        "INSERT INTO import_progress
             (country_code, current_admin_level, status, relations_fetched, errors,
              started_at, completed_at, last_error)
         VALUES ($1, $2, $3, 0, 0, NOW(), NULL, NULL)
         ON CONFLICT (country_code) DO UPDATE SET
             current_admin_level = EXCLUDED.current_admin_level,
             status = EXCLUDED.status,
             relations_fetched = 0,
             errors = 0,
             started_at = NOW(),
             completed_at = NULL,
             last_error = NULL",
        &[
            DatabaseValue::String(country_code.to_string()),
            DatabaseValue::Number(i64::from(min_level)),
            DatabaseValue::String(CountryStatus::InProgress.to_string()),
        ],
    )
    .await?;

    Ok(())
}

/// Records a completed admin level: bumps `current_admin_level` and adds
/// to the cumulative fetch counter. Levels are processed in ascending
/// order, so the recorded level never decreases within a run.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn record_level(
    db: &dyn Database,
    country_code: &str,
    level: u8,
    relations_fetched: u64,
) -> Result<(), DbError> {
    db.exec_raw_params(
        "UPDATE import_progress SET
             current_admin_level = $2,
             relations_fetched = relations_fetched + $3
         WHERE country_code = $1",
        &[
            DatabaseValue::String(country_code.to_string()),
            DatabaseValue::Number(i64::from(level)),
            DatabaseValue::Number(i64::try_from(relations_fetched).unwrap_or(i64::MAX)),
        ],
    )
    .await?;

    Ok(())
}

/// Adds to a country's cumulative non-fatal error counter.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn add_errors(db: &dyn Database, country_code: &str, count: u64) -> Result<(), DbError> {
    db.exec_raw_params(
        "UPDATE import_progress SET errors = errors + $2 WHERE country_code = $1",
        &[
            DatabaseValue::String(country_code.to_string()),
            DatabaseValue::Number(i64::try_from(count).unwrap_or(i64::MAX)),
        ],
    )
    .await?;

    Ok(())
}

/// Marks a country's import as completed.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn mark_completed(db: &dyn Database, country_code: &str) -> Result<(), DbError> {
    db.exec_raw_params(
        "UPDATE import_progress SET
             status = $2,
             completed_at = NOW()
         WHERE country_code = $1",
        &[
            DatabaseValue::String(country_code.to_string()),
            DatabaseValue::String(CountryStatus::Completed.to_string()),
        ],
    )
    .await?;

    Ok(())
}

/// Marks a country's import as failed with a one-line reason.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn mark_failed(
    db: &dyn Database,
    country_code: &str,
    reason: &str,
) -> Result<(), DbError> {
    db.exec_raw_params(
        "UPDATE import_progress SET
             status = $2,
             last_error = $3
         WHERE country_code = $1",
        &[
            DatabaseValue::String(country_code.to_string()),
            DatabaseValue::String(CountryStatus::Failed.to_string()),
            DatabaseValue::String(reason.to_string()),
        ],
    )
    .await?;

    Ok(())
}

/// Loads every progress row, ordered by country code.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails or a row cannot be
/// decoded.
pub async fn all(db: &dyn Database) -> Result<Vec<ImportProgress>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT country_code, current_admin_level, status, relations_fetched, errors,
                    started_at::text AS started_at,
                    completed_at::text AS completed_at,
                    last_error
             FROM import_progress
             ORDER BY country_code",
            &[],
        )
        .await?;

    rows.iter().map(parse_progress_row).collect()
}

/// The set of country codes whose import already completed.
///
/// # Errors
///
/// Returns [`DbError`] if the database operation fails.
pub async fn completed_countries(db: &dyn Database) -> Result<BTreeSet<String>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT country_code FROM import_progress WHERE status = $1",
            &[DatabaseValue::String(CountryStatus::Completed.to_string())],
        )
        .await?;

    rows.iter()
        .map(|row| {
            row.to_value::<String>("country_code")
                .map_err(|e| DbError::Conversion {
                    message: format!("Failed to read country_code: {e}"),
                })
        })
        .collect()
}

fn parse_progress_row(row: &switchy_database::Row) -> Result<ImportProgress, DbError> {
    let status_text: String = row.to_value("status").map_err(|e| DbError::Conversion {
        message: format!("Failed to read status: {e}"),
    })?;
    let status = CountryStatus::from_str(&status_text).map_err(|e| DbError::Conversion {
        message: format!("Unknown status '{status_text}': {e}"),
    })?;

    let level: i32 = row
        .to_value("current_admin_level")
        .map_err(|e| DbError::Conversion {
            message: format!("Failed to read current_admin_level: {e}"),
        })?;
    let current_admin_level = u8::try_from(level).map_err(|e| DbError::Conversion {
        message: format!("current_admin_level {level} out of range: {e}"),
    })?;

    Ok(ImportProgress {
        country_code: row.to_value("country_code").map_err(|e| DbError::Conversion {
            message: format!("Failed to read country_code: {e}"),
        })?,
        current_admin_level,
        status,
        relations_fetched: row
            .to_value("relations_fetched")
            .map_err(|e| DbError::Conversion {
                message: format!("Failed to read relations_fetched: {e}"),
            })?,
        errors: row.to_value("errors").map_err(|e| DbError::Conversion {
            message: format!("Failed to read errors: {e}"),
        })?,
        started_at: row.to_value("started_at").map_err(|e| DbError::Conversion {
            message: format!("Failed to read started_at: {e}"),
        })?,
        completed_at: row.to_value("completed_at").map_err(|e| DbError::Conversion {
            message: format!("Failed to read completed_at: {e}"),
        })?,
        last_error: row.to_value("last_error").map_err(|e| DbError::Conversion {
            message: format!("Failed to read last_error: {e}"),
        })?,
    })
}
