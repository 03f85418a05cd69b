// ABOUTME: Outcome types for rows, tables and whole migration runs
// ABOUTME: Represents row, table and connection failure tiers as explicit values

use crate::migration::value::Value;

/// Result of inserting one row at the destination
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// `returned` holds the stored value of the plan's `returning` column
    Imported { returned: Option<Value> },
    Failed { reason: String },
}

impl RowOutcome {
    pub fn imported() -> Self {
        RowOutcome::Imported { returned: None }
    }
}

/// A row that could not be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// Zero-based position of the row in the source read
    pub index: usize,
    pub reason: String,
}

/// Counts for a table whose transaction was committed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableReport {
    pub found: usize,
    pub imported: usize,
    /// Rows deleted from the destination before inserting
    pub cleared: u64,
    pub failures: Vec<RowFailure>,
    /// Error previews written to the log, capped per table
    pub logged_errors: Vec<String>,
    /// Foreign key values with no match in their parent table, stored as NULL
    pub unmapped_keys: usize,
}

impl TableReport {
    pub fn errors(&self) -> usize {
        self.failures.len()
    }

    pub fn record(&mut self, index: usize, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Imported { .. } => self.imported += 1,
            RowOutcome::Failed { reason } => self.failures.push(RowFailure { index, reason }),
        }
    }
}

/// What happened to one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// Source had no rows; the destination was not touched
    Empty,
    /// Delete and inserts committed
    Migrated(TableReport),
    /// Rolled back after a table-level error
    Failed { found: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableResult {
    pub table: String,
    pub outcome: TableOutcome,
}

/// Per-invocation summary, in table order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationRun {
    pub tables: Vec<TableResult>,
}

impl MigrationRun {
    pub fn push(&mut self, table: impl Into<String>, outcome: TableOutcome) {
        self.tables.push(TableResult {
            table: table.into(),
            outcome,
        });
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|result| result.table == table)
            .map(|result| &result.outcome)
    }

    pub fn total_found(&self) -> usize {
        self.tables
            .iter()
            .map(|result| match &result.outcome {
                TableOutcome::Empty => 0,
                TableOutcome::Migrated(report) => report.found,
                TableOutcome::Failed { found, .. } => *found,
            })
            .sum()
    }

    pub fn total_imported(&self) -> usize {
        self.reports().map(|report| report.imported).sum()
    }

    pub fn total_row_errors(&self) -> usize {
        self.reports().map(TableReport::errors).sum()
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|result| matches!(result.outcome, TableOutcome::Failed { .. }))
            .map(|result| result.table.as_str())
            .collect()
    }

    fn reports(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter_map(|result| match &result.outcome {
            TableOutcome::Migrated(report) => Some(report),
            _ => None,
        })
    }
}
