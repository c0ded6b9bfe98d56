#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the boundary import pipeline.
//!
//! Two import modes: a single country by ISO3 code, or every pending
//! country from the built-in catalogue. `status` prints the progress
//! table. Configuration comes from `DATABASE_URL`, `OVERPASS_URL`, and
//! `WIKIDATA_API_URL`; the admin-level range defaults to 4-11.

use std::time::Instant;

use boundary_map_cli_utils::IndicatifProgress;
use boundary_map_import::{ImportArgs, run_all, run_country};
use boundary_map_overpass::OverpassClient;
use boundary_map_wikidata::WikidataClient;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "boundary-map", about = "Administrative boundary importer", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one country's administrative boundaries
    Import {
        /// ISO 3166-1 alpha-3 country code (e.g., "BEL")
        country: String,
        /// First admin level to discover (2-11)
        #[arg(long, default_value = "4")]
        min_level: u8,
        /// Last admin level to discover (2-11)
        #[arg(long, default_value = "11")]
        max_level: u8,
    },
    /// Import every catalogue country that has not completed yet
    ImportAll {
        /// First admin level to discover (2-11)
        #[arg(long, default_value = "4")]
        min_level: u8,
        /// Last admin level to discover (2-11)
        #[arg(long, default_value = "11")]
        max_level: u8,
    },
    /// Show per-country import progress
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = boundary_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let db = boundary_map_database::db::connect_from_env().await?;

    match cli.command {
        Commands::Import {
            country,
            min_level,
            max_level,
        } => {
            let overpass = OverpassClient::from_env()?;
            let wikidata = WikidataClient::from_env()?;
            let progress = IndicatifProgress::import_bar(&multi, &country);

            let start = Instant::now();
            let summary = run_country(
                db.as_ref(),
                &overpass,
                &wikidata,
                ImportArgs {
                    country_code: country.to_uppercase(),
                    min_level,
                    max_level,
                },
                &progress,
            )
            .await?;

            let elapsed = start.elapsed();
            log::info!(
                "{}: import complete — {} enriched rows in {:.1}s",
                summary.country_code,
                summary.inserted,
                elapsed.as_secs_f64()
            );

            if summary.has_errors() {
                return Err(format!(
                    "{}: import completed with errors ({} row errors, {} null-field rows, {} invalid-geometry rows)",
                    summary.country_code,
                    summary.insert_errors.len(),
                    summary.verification.null_field_rows,
                    summary.verification.invalid_geometry_rows
                )
                .into());
            }
        }
        Commands::ImportAll {
            min_level,
            max_level,
        } => {
            let overpass = OverpassClient::from_env()?;
            let wikidata = WikidataClient::from_env()?;
            let progress = IndicatifProgress::import_bar(&multi, "importing countries");

            let start = Instant::now();
            let result = run_all(
                db.as_ref(),
                &overpass,
                &wikidata,
                min_level,
                max_level,
                &progress,
            )
            .await?;

            let elapsed = start.elapsed();
            log::info!(
                "Multi-country import complete: {} succeeded, {} failed in {:.1}s",
                result.completed.len(),
                result.failed.len(),
                elapsed.as_secs_f64()
            );

            if !result.failed.is_empty() {
                return Err(format!(
                    "{} country import(s) failed: {}",
                    result.failed.len(),
                    result.failed.join(", ")
                )
                .into());
            }
        }
        Commands::Status => {
            let rows = boundary_map_database::progress::all(db.as_ref()).await?;

            println!(
                "{:<8} {:<12} {:<6} {:>10} {:>7}  LAST ERROR",
                "COUNTRY", "STATUS", "LEVEL", "FETCHED", "ERRORS"
            );
            println!("{}", "-".repeat(72));
            for row in &rows {
                println!(
                    "{:<8} {:<12} {:<6} {:>10} {:>7}  {}",
                    row.country_code,
                    row.status.to_string(),
                    row.current_admin_level,
                    row.relations_fetched,
                    row.errors,
                    row.last_error.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
