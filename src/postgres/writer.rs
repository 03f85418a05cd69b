// ABOUTME: PostgreSQL destination for migrated rows
// ABOUTME: Runs each table in one transaction and isolates every insert in a savepoint

use crate::migration::{Destination, InsertPlan, RowOutcome, Value};
use crate::postgres::params::{binds_natively, cast_type_name, SqlParam};
use crate::utils::{quote_ident, validate_table_name};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Client;
use uuid::Uuid;

const ROW_SAVEPOINT: &str = "migrate_row";

/// Transactional writer over a single PostgreSQL connection
pub struct PostgresDestination {
    client: Client,
    in_transaction: bool,
}

impl PostgresDestination {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            in_transaction: false,
        }
    }

    pub async fn connect(connection_string: &str) -> Result<Self> {
        Ok(Self::new(crate::postgres::connect(connection_string).await?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl PostgresDestination {
    /// Prepare and run one INSERT, returning the `returning` column's value
    ///
    /// Text bound for a column type without a binary encoding is resent as
    /// `$n::text::type` so the server parses it.
    async fn execute_insert(&self, plan: &InsertPlan) -> Result<Option<Value>> {
        let mut statement = self.client.prepare(plan.sql.as_str()).await?;

        let casts: BTreeMap<usize, String> = plan
            .values
            .iter()
            .zip(statement.params())
            .enumerate()
            .filter(|(_, (value, ty))| !binds_natively(value, ty))
            .map(|(idx, (_, ty))| (idx, cast_type_name(ty)))
            .collect();
        if !casts.is_empty() {
            let sql = plan.sql_with_casts(&casts);
            tracing::debug!("Casting text parameters: {}", sql);
            statement = self.client.prepare(sql.as_str()).await?;
        }

        let params: Vec<SqlParam<'_>> = plan.values.iter().map(SqlParam).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect();

        if plan.returning.is_none() {
            self.client.execute(&statement, &param_refs).await?;
            return Ok(None);
        }

        let row = self.client.query_one(&statement, &param_refs).await?;
        returned_value(&row).map(Some)
    }
}

/// First column of a RETURNING row as a migration value
fn returned_value(row: &tokio_postgres::Row) -> Result<Value> {
    let Some(column) = row.columns().first() else {
        anyhow::bail!("RETURNING produced no columns");
    };

    let value = match *column.type_() {
        Type::INT2 => row.try_get::<_, Option<i16>>(0)?.map(|v| Value::Integer(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(0)?.map(|v| Value::Integer(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(0)?.map(Value::Integer),
        Type::UUID => row
            .try_get::<_, Option<Uuid>>(0)?
            .map(|v| Value::Text(v.to_string())),
        Type::TEXT | Type::VARCHAR => row.try_get::<_, Option<String>>(0)?.map(Value::Text),
        ref other => anyhow::bail!(
            "Cannot map returned key column '{}' of type {}",
            column.name(),
            other
        ),
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Server message for database errors, full description otherwise
fn describe_error(error: &anyhow::Error) -> String {
    match error
        .downcast_ref::<tokio_postgres::Error>()
        .and_then(tokio_postgres::Error::as_db_error)
    {
        Some(db_error) => db_error.message().to_string(),
        None => format!("{:#}", error),
    }
}

impl Destination for PostgresDestination {
    async fn begin(&mut self) -> Result<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .context("Failed to begin transaction")?;
        self.in_transaction = true;
        Ok(())
    }

    async fn clear_table(&mut self, table: &str) -> Result<u64> {
        validate_table_name(table).context("Invalid table name for delete")?;

        let query = format!("DELETE FROM {}", quote_ident(table));
        let deleted = self
            .client
            .execute(query.as_str(), &[])
            .await
            .with_context(|| format!("DELETE FROM {} failed", table))?;

        tracing::debug!("Deleted {} rows from '{}'", deleted, table);
        Ok(deleted)
    }

    async fn insert_row(&mut self, plan: &InsertPlan) -> Result<RowOutcome> {
        self.client
            .batch_execute(&format!("SAVEPOINT {}", ROW_SAVEPOINT))
            .await
            .context("Failed to create row savepoint")?;

        match self.execute_insert(plan).await {
            Ok(returned) => {
                self.client
                    .batch_execute(&format!("RELEASE SAVEPOINT {}", ROW_SAVEPOINT))
                    .await
                    .context("Failed to release row savepoint")?;
                Ok(RowOutcome::Imported { returned })
            }
            Err(e) => {
                if self.client.is_closed() {
                    return Err(e.context("Connection to destination lost"));
                }

                tracing::debug!("Insert rejected: {:#} ({})", e, plan.sql);
                self.client
                    .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", ROW_SAVEPOINT))
                    .await
                    .context("Failed to roll back row savepoint")?;

                Ok(RowOutcome::Failed {
                    reason: describe_error(&e),
                })
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client
            .batch_execute("COMMIT")
            .await
            .context("Failed to commit transaction")
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client
            .batch_execute("ROLLBACK")
            .await
            .context("Failed to roll back transaction")
    }

    async fn count_rows(&mut self, table: &str) -> Result<i64> {
        validate_table_name(table).context("Invalid table name for count query")?;

        let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row = self
            .client
            .query_one(query.as_str(), &[])
            .await
            .with_context(|| format!("Failed to count rows in '{}'", table))?;

        Ok(row.get(0))
    }
}
