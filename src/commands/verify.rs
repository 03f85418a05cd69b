// ABOUTME: Verify command implementation - compare row counts after a migration
// ABOUTME: Counts each configured table in the SQLite source and PostgreSQL target

use crate::config::MigrationConfig;
use crate::migration::{Destination, Source};
use crate::postgres::PostgresDestination;
use crate::sqlite::SqliteSource;
use anyhow::{Context, Result};

/// Row counts of one table on both sides
#[derive(Debug, Clone, PartialEq)]
pub struct CountComparison {
    pub table: String,
    pub source_count: Result<i64, String>,
    pub target_count: Result<i64, String>,
}

impl CountComparison {
    pub fn matches(&self) -> bool {
        matches!((&self.source_count, &self.target_count), (Ok(s), Ok(t)) if s == t)
    }
}

/// Count every configured table on both sides, in config order
///
/// A table that cannot be counted on one side is recorded, not fatal.
pub async fn compare_counts<S: Source, D: Destination>(
    config: &MigrationConfig,
    source: &mut S,
    destination: &mut D,
) -> Vec<CountComparison> {
    let mut comparisons = Vec::with_capacity(config.tables.len());

    for table in &config.tables {
        let source_count = source
            .count_rows(&table.name)
            .map_err(|e| format!("{:#}", e));
        let target_count = destination
            .count_rows(&table.name)
            .await
            .map_err(|e| format!("{:#}", e));

        comparisons.push(CountComparison {
            table: table.name.clone(),
            source_count,
            target_count,
        });
    }

    comparisons
}

/// Verify that every configured table has the same row count on both sides
///
/// Row-level insert errors during `migrate` show up here as mismatches.
///
/// # Errors
///
/// Returns an error if either database cannot be reached, or if any table
/// differs or cannot be counted.
pub async fn verify(source_path: &str, target_url: &str, config: MigrationConfig) -> Result<()> {
    tracing::info!("Starting row count verification...");
    tracing::info!("");

    tracing::info!("Connecting to source database...");
    let mut source =
        SqliteSource::open(source_path).context("Failed to connect to source database")?;

    tracing::info!("Connecting to target database...");
    let mut destination = PostgresDestination::connect(target_url)
        .await
        .context("Failed to connect to target database")?;

    let comparisons = compare_counts(&config, &mut source, &mut destination).await;

    let mut mismatches = 0;
    for comparison in &comparisons {
        match (&comparison.source_count, &comparison.target_count) {
            (Ok(s), Ok(t)) if s == t => {
                tracing::info!("  ✓ {}: {} rows", comparison.table, s);
            }
            (Ok(s), Ok(t)) => {
                tracing::warn!(
                    "  ⚠ {}: source={}, target={}",
                    comparison.table,
                    s,
                    t
                );
                mismatches += 1;
            }
            (source_count, target_count) => {
                if let Err(e) = source_count {
                    tracing::error!("  ✗ {}: source: {}", comparison.table, e);
                }
                if let Err(e) = target_count {
                    tracing::error!("  ✗ {}: target: {}", comparison.table, e);
                }
                mismatches += 1;
            }
        }
    }

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Verification Summary");
    tracing::info!("========================================");
    tracing::info!("Total tables: {}", comparisons.len());
    tracing::info!("✓ Matches: {}", comparisons.len() - mismatches);
    tracing::info!("✗ Mismatches: {}", mismatches);
    tracing::info!("========================================");

    if mismatches > 0 {
        anyhow::bail!("{} table(s) failed verification", mismatches);
    }

    tracing::info!("✓ ALL TABLES VERIFIED SUCCESSFULLY!");
    Ok(())
}
