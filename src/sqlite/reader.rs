// ABOUTME: SQLite data reading functions for table introspection and row retrieval
// ABOUTME: Provides read-only access to SQLite tables with identifier validation

use crate::migration::Row;
use crate::sqlite::converter::sqlite_row_to_row;
use crate::utils::{quote_ident, validate_table_name};
use anyhow::{Context, Result};
use rusqlite::Connection;

/// List all user tables in a SQLite database
///
/// Internal `sqlite_*` tables are excluded. Names are returned sorted.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .context("Failed to prepare table listing query")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to list SQLite tables")?
        .collect::<rusqlite::Result<Vec<String>>>()
        .context("Failed to read SQLite table names")?;

    tracing::debug!("Found {} tables in SQLite database", tables.len());

    Ok(tables)
}

/// Get the row count of a SQLite table
pub fn get_table_row_count(conn: &Connection, table: &str) -> Result<i64> {
    validate_table_name(table).context("Invalid table name for count query")?;

    let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let count = conn
        .query_row(&query, [], |row| row.get::<_, i64>(0))
        .with_context(|| format!("Failed to count rows in table '{}'", table))?;

    Ok(count)
}

/// Read every row of a SQLite table
///
/// Rows keep the table's column order. The whole table is held in memory.
pub fn read_table_rows(conn: &Connection, table: &str) -> Result<Vec<Row>> {
    validate_table_name(table).context("Invalid table name for data reading")?;

    tracing::debug!("Reading all rows from SQLite table '{}'", table);

    let query = format!("SELECT * FROM {}", quote_ident(table));
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to query table '{}'", table))?;

    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt
        .query([])
        .with_context(|| format!("Failed to query table '{}'", table))?;

    let mut result = Vec::new();
    while let Some(row) = rows
        .next()
        .with_context(|| format!("Failed to read row from table '{}'", table))?
    {
        let converted = sqlite_row_to_row(row, &column_names).with_context(|| {
            format!("Failed to convert row {} of table '{}'", result.len() + 1, table)
        })?;
        result.push(converted);
    }

    tracing::debug!("Read {} rows from SQLite table '{}'", result.len(), table);

    Ok(result)
}
