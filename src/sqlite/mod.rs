// ABOUTME: SQLite source database access for migration to PostgreSQL
// ABOUTME: Provides path validation, read-only connections, and the row Source implementation

pub mod converter;
pub mod reader;

use crate::migration::{Row, Source};
use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// Validate a SQLite database path
///
/// The file must exist and be a regular file. A PostgreSQL URL passed by
/// mistake is rejected with a hint.
///
/// # Examples
///
/// ```
/// # use sqlite_pg_migrator::sqlite::validate_sqlite_path;
/// assert!(validate_sqlite_path("").is_err());
/// assert!(validate_sqlite_path("postgresql://user@host/db").is_err());
/// assert!(validate_sqlite_path("/nonexistent/payload.db").is_err());
/// ```
pub fn validate_sqlite_path(path: &str) -> Result<PathBuf> {
    if path.trim().is_empty() {
        bail!("SQLite database path cannot be empty");
    }

    if path.starts_with("postgres://") || path.starts_with("postgresql://") {
        bail!(
            "Source must be a SQLite database file, got a PostgreSQL URL.\n\
             Pass the path to the .db file with --source"
        );
    }

    let path = Path::new(path);
    if !path.exists() {
        bail!("SQLite database not found at: {}", path.display());
    }
    if !path.is_file() {
        bail!("SQLite database path is not a file: {}", path.display());
    }

    Ok(path.to_path_buf())
}

/// Open a SQLite database read-only
///
/// The source is never modified: the connection is opened with
/// `SQLITE_OPEN_READ_ONLY` and any write fails at the SQLite level.
pub fn connect_sqlite(path: &str) -> Result<Connection> {
    let path = validate_sqlite_path(path)?;

    tracing::info!("Opening SQLite database {}", path.display());

    let conn = Connection::open_with_flags(
        &path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;

    // Opening is lazy; touch the schema so a corrupt file fails here
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .with_context(|| format!("{} is not a readable SQLite database", path.display()))?;

    Ok(conn)
}

/// Row source backed by a read-only SQLite connection
pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(connect_sqlite(path)?))
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        reader::list_tables(&self.conn)
    }
}

impl Source for SqliteSource {
    fn read_table(&mut self, table: &str) -> Result<Vec<Row>> {
        reader::read_table_rows(&self.conn, table)
    }

    fn count_rows(&mut self, table: &str) -> Result<i64> {
        reader::get_table_row_count(&self.conn, table)
    }
}
