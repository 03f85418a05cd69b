// ABOUTME: Table-by-table copy loop between a row source and a transactional destination
// ABOUTME: Applies the clear-then-insert policy with per-row and per-table error isolation

use crate::config::{MigrationConfig, TableConfig};
use crate::migration::keys::{KeyMap, KeyMaps};
use crate::migration::plan::{plan_insert, InsertPlan};
use crate::migration::report::{MigrationRun, RowOutcome, TableOutcome, TableReport};
use crate::migration::value::Row;
use crate::utils::truncate_message;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

/// Row-level error messages logged per table; the rest are only counted
pub const MAX_LOGGED_ERRORS: usize = 3;

/// Row-level error messages are cut to this many characters in the log
pub const ERROR_PREVIEW_CHARS: usize = 80;

/// Read side of a migration
pub trait Source {
    /// All rows of a table, columns in source order
    fn read_table(&mut self, table: &str) -> Result<Vec<Row>>;

    fn count_rows(&mut self, table: &str) -> Result<i64>;
}

/// Write side of a migration
///
/// The migrator calls `begin`, `clear_table`, any number of `insert_row`, then
/// `commit`, or `rollback` once something fails outside a single row.
#[allow(async_fn_in_trait)]
pub trait Destination {
    async fn begin(&mut self) -> Result<()>;

    /// Delete every row of `table`, returning how many were removed
    async fn clear_table(&mut self, table: &str) -> Result<u64>;

    /// Insert one row in isolation from the rest of the transaction
    ///
    /// A rejected row is `Ok(RowOutcome::Failed)`. `Err` means the transaction
    /// itself can no longer be used. When the plan names a `returning` column,
    /// an imported row reports the value stored there.
    async fn insert_row(&mut self, plan: &InsertPlan) -> Result<RowOutcome>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    async fn count_rows(&mut self, table: &str) -> Result<i64>;
}

pub struct Migrator<S, D> {
    source: S,
    destination: D,
    config: MigrationConfig,
    keys: KeyMaps,
    show_progress: bool,
}

impl<S: Source, D: Destination> Migrator<S, D> {
    pub fn new(source: S, destination: D, config: MigrationConfig) -> Self {
        Self {
            source,
            destination,
            config,
            keys: KeyMaps::default(),
            show_progress: false,
        }
    }

    /// Draw a per-table row progress bar while inserting
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn into_parts(self) -> (S, D) {
        (self.source, self.destination)
    }

    /// Migrate every configured table in order
    ///
    /// Never fails as a whole: table failures are recorded in the returned run.
    pub async fn run(&mut self) -> MigrationRun {
        let tables = self.config.tables.clone();
        let mut run = MigrationRun::default();
        self.keys.clear();

        for (idx, table) in tables.iter().enumerate() {
            tracing::info!(
                "📦 Migrating {} ({}/{})...",
                table.name,
                idx + 1,
                tables.len()
            );
            let outcome = self.migrate_table(table).await;
            run.push(table.name.clone(), outcome);
            tracing::info!("");
        }

        run
    }

    /// Copy one table: read all, clear destination, insert row by row, commit
    ///
    /// Foreign key columns are rewritten with the keys of parent tables
    /// migrated earlier by this migrator.
    pub async fn migrate_table(&mut self, table: &TableConfig) -> TableOutcome {
        let rows = match self
            .source
            .read_table(&table.name)
            .with_context(|| format!("Failed to read table '{}' from source", table.name))
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("  ✗ Error: {:#}", e);
                return TableOutcome::Failed {
                    found: 0,
                    reason: format!("{:#}", e),
                };
            }
        };

        let tracks_keys = self.config.is_referenced(&table.name);

        if rows.is_empty() {
            tracing::info!("  ⚠ No data found");
            if tracks_keys {
                self.keys.register(table.name.clone(), KeyMap::default());
            }
            return TableOutcome::Empty;
        }

        let found = rows.len();
        tracing::info!("  Found {} records", found);

        for parent in self.keys.missing_parents(table) {
            tracing::warn!(
                "  ⚠ '{}' was not migrated in this run; its keys are copied unchanged",
                parent
            );
        }

        match self.copy_rows(table, rows, tracks_keys).await {
            Ok((report, keys)) => {
                if report.errors() > 0 {
                    tracing::warn!(
                        "  ✓ Imported {}/{} records ({} errors)",
                        report.imported,
                        report.found,
                        report.errors()
                    );
                } else {
                    tracing::info!("  ✓ Imported {}/{} records", report.imported, report.found);
                }
                if report.unmapped_keys > 0 {
                    tracing::warn!(
                        "  ⚠ {} foreign key value(s) had no match and were stored as NULL",
                        report.unmapped_keys
                    );
                }
                if tracks_keys {
                    tracing::debug!("  Mapped {} '{}' keys", keys.len(), table.name);
                    self.keys.register(table.name.clone(), keys);
                }
                TableOutcome::Migrated(report)
            }
            Err(e) => {
                tracing::error!("  ✗ Error: {:#}", e);
                if let Err(rollback_err) = self.destination.rollback().await {
                    tracing::warn!("  ⚠ Rollback of '{}' failed: {:#}", table.name, rollback_err);
                } else {
                    tracing::info!("  Rolled back changes to '{}'", table.name);
                }
                TableOutcome::Failed {
                    found,
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    async fn copy_rows(
        &mut self,
        table: &TableConfig,
        rows: Vec<Row>,
        tracks_keys: bool,
    ) -> Result<(TableReport, KeyMap)> {
        let detect_json = self.config.detect_json;

        self.destination
            .begin()
            .await
            .with_context(|| format!("Failed to start transaction for '{}'", table.name))?;

        let cleared = self
            .destination
            .clear_table(&table.name)
            .await
            .with_context(|| format!("Failed to clear destination table '{}'", table.name))?;
        tracing::info!("  🗑 Cleared existing data ({} rows)", cleared);

        let mut report = TableReport {
            found: rows.len(),
            cleared,
            ..Default::default()
        };
        let mut keys = KeyMap::default();
        let progress = self.progress_bar(rows.len());

        for (index, mut row) in rows.into_iter().enumerate() {
            let source_key = if tracks_keys {
                row.get(&table.key_column).cloned()
            } else {
                None
            };
            report.unmapped_keys += self.keys.remap_row(table, &mut row);

            let outcome = match plan_insert(table, row, detect_json) {
                Ok(plan) => {
                    let plan = if tracks_keys {
                        plan.returning(table.key_column.as_str())
                    } else {
                        plan
                    };
                    self.destination.insert_row(&plan).await.with_context(|| {
                        format!("Failed to insert row {} into '{}'", index + 1, table.name)
                    })?
                }
                Err(e) => RowOutcome::Failed {
                    reason: format!("{:#}", e),
                },
            };

            match &outcome {
                RowOutcome::Imported {
                    returned: Some(destination_key),
                } => {
                    if let Some(source_key) = &source_key {
                        keys.insert(source_key, destination_key.clone());
                    }
                }
                RowOutcome::Failed { reason } if report.logged_errors.len() < MAX_LOGGED_ERRORS => {
                    let preview = truncate_message(reason, ERROR_PREVIEW_CHARS);
                    progress.suspend(|| tracing::warn!("  ⚠ Error: {}", preview));
                    report.logged_errors.push(preview);
                }
                _ => {}
            }

            report.record(index, outcome);
            progress.inc(1);
        }
        progress.finish_and_clear();

        self.destination
            .commit()
            .await
            .with_context(|| format!("Failed to commit '{}'", table.name))?;

        Ok((report, keys))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::with_template("  [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}")
            .map(|style| style.progress_chars("##-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(len as u64).with_style(style)
    }
}
