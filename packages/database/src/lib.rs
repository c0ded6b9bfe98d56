#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `PostGIS` storage for the boundary import pipeline.
//!
//! Three tables, all assumed to exist (schema management happens outside
//! this tool): `osm_boundary_relations` (raw discovery output, unique on
//! `(relation_id, country_code)`), `enriched_boundaries` (the
//! consumer-facing projection, unique on `wikidata_id`), and
//! `import_progress` (the per-country tracker).
//!
//! Spatial values go through raw SQL with `ST_GeomFromEWKT` /
//! `ST_AsEWKT`; everything else uses `query_raw_params()` /
//! `exec_raw_params()` with positional parameters.

pub mod boundaries;
pub mod db;
pub mod progress;
pub mod relations;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
