//! Batched upsert into the enriched boundaries table.
//!
//! Each batch runs in its own transaction pinned to one pooled
//! connection. A single bad record must not sink the other 999 in its
//! batch, so every row is wrapped in a savepoint: a row failure rolls
//! back to the savepoint, is captured, and the batch keeps going. Only a
//! transaction-level failure abandons the batch.

use boundary_map_database_models::{EnrichedRecord, InsertStats, RowInsertError};
use switchy_database::{Database, DatabaseValue};

use crate::DbError;

/// Records per transaction.
pub const DB_BATCH_SIZE: usize = 1000;

/// How a batch transaction failed, so the caller can tell a dead
/// database apart from a single bad batch.
enum BatchError {
    /// The transaction could not be started at all.
    Begin(DbError),
    /// The transaction died mid-batch or failed to commit.
    Transaction(DbError),
}

/// Upserts enriched records in batches of [`DB_BATCH_SIZE`].
///
/// On conflict with an existing `wikidata_id` the category, level, name,
/// and geometry are overwritten, making a refresh run idempotent. Per-row
/// failures are collected into the returned [`InsertStats`]; a failed
/// batch transaction is rolled back and the remaining batches still run.
///
/// # Errors
///
/// Returns [`DbError`] only if a transaction cannot even be started —
/// everything else degrades to the error list.
pub async fn upsert_enriched(
    db: &dyn Database,
    records: &[EnrichedRecord],
) -> Result<InsertStats, DbError> {
    let mut stats = InsertStats::default();

    for batch in records.chunks(DB_BATCH_SIZE) {
        match persist_batch(db, batch, &mut stats.errors).await {
            Ok(inserted) => stats.inserted += inserted,
            Err(BatchError::Begin(e)) => return Err(e),
            Err(BatchError::Transaction(e)) => {
                // The transaction is aborted server-side; dropping the
                // handle rolls it back. Continue with the next batch.
                log::error!("batch of {} enriched rows rolled back: {e}", batch.len());
            }
        }
    }

    Ok(stats)
}

/// Runs one batch inside a transaction, capturing per-row failures.
///
/// Postgres aborts the whole transaction once any statement in it
/// errors, so each row runs under a savepoint: on failure the
/// transaction rolls back to the savepoint and the remaining rows still
/// apply. Redefining the same savepoint name per row is fine — Postgres
/// replaces it.
async fn persist_batch(
    db: &dyn Database,
    batch: &[EnrichedRecord],
    errors: &mut Vec<RowInsertError>,
) -> Result<u64, BatchError> {
    let tx = db
        .begin_transaction()
        .await
        .map_err(|e| BatchError::Begin(e.into()))?;

    let mut inserted = 0u64;

    for record in batch {
        tx.exec_raw_params("SAVEPOINT boundary_row", &[])
            .await
            .map_err(|e| BatchError::Transaction(e.into()))?;

        let result = tx
            .exec_raw_params(
                "INSERT INTO enriched_boundaries
                     (wikidata_id, commons_category, admin_level, name, geom)
                 VALUES ($1, $2, $3, $4, ST_GeomFromEWKT($5))
                 ON CONFLICT (wikidata_id) DO UPDATE SET
                     commons_category = EXCLUDED.commons_category,
                     admin_level = EXCLUDED.admin_level,
                     name = EXCLUDED.name,
                     geom = EXCLUDED.geom",
                &[
                    DatabaseValue::String(record.wikidata_id.clone()),
                    DatabaseValue::String(record.commons_category.clone()),
                    DatabaseValue::Number(i64::from(record.admin_level)),
                    DatabaseValue::String(record.name.clone()),
                    DatabaseValue::String(record.geom_ewkt.clone()),
                ],
            )
            .await;

        match result {
            Ok(_) => inserted += 1,
            Err(e) => {
                errors.push(RowInsertError {
                    record_name: record.name.clone(),
                    error: e.to_string(),
                });
                // Discard only this row's effect; the batch survives.
                tx.exec_raw_params("ROLLBACK TO SAVEPOINT boundary_row", &[])
                    .await
                    .map_err(|e| BatchError::Transaction(e.into()))?;
            }
        }
    }

    tx.commit()
        .await
        .map_err(|e| BatchError::Transaction(e.into()))?;

    Ok(inserted)
}
