// ABOUTME: Builds parameterized INSERT statements from source rows
// ABOUTME: Drops the key column and tags JSON values for an explicit jsonb cast

use crate::config::{ColumnHint, TableConfig};
use crate::migration::value::{Row, Value};
use crate::utils::quote_ident;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Cast appended to placeholders of JSON-tagged values
pub const JSON_CAST: &str = "jsonb";

/// A ready-to-execute INSERT for one row
#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    pub table: String,
    pub sql: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
    /// Column whose inserted value the destination reports back
    pub returning: Option<String>,
}

impl InsertPlan {
    /// Ask the destination to report the value it stored in `column`
    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self.sql = self.sql_with_casts(&BTreeMap::new());
        self
    }

    /// The statement with some parameters sent as text and cast to a column type
    ///
    /// `casts` maps a zero-based parameter index to a type name, giving
    /// `$n::text::type` for that placeholder.
    pub fn sql_with_casts(&self, casts: &BTreeMap<usize, String>) -> String {
        build_insert_sql(
            &self.table,
            &self.columns,
            &self.values,
            self.returning.as_deref(),
            casts,
        )
    }

    /// Columns bound with a JSON cast
    pub fn json_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .zip(&self.values)
            .filter(|(_, value)| value.is_json())
            .map(|(column, _)| column.as_str())
            .collect()
    }
}

/// True when text starts with `{` or `[`, the only shapes sniffed as JSON
pub fn looks_like_json(text: &str) -> bool {
    text.starts_with('{') || text.starts_with('[')
}

/// Decide how a single column value is bound
///
/// Hinted columns follow the hint. Without a hint, brace-leading text that
/// parses as JSON becomes [`Value::Json`]; text that fails to parse stays
/// opaque text. An error here fails only the current row.
pub fn prepare_value(value: Value, hint: Option<ColumnHint>, detect_json: bool) -> Result<Value> {
    match hint {
        Some(ColumnHint::Text) => Ok(match value {
            Value::Json(text) => Value::Text(text),
            other => other,
        }),
        Some(ColumnHint::Json) => match value {
            Value::Null => Ok(Value::Null),
            Value::Text(text) | Value::Json(text) => {
                if let Err(e) = serde_json::from_str::<serde_json::Value>(&text) {
                    bail!("invalid JSON: {}", e);
                }
                Ok(Value::Json(text))
            }
            Value::Integer(i) => Ok(Value::Json(i.to_string())),
            Value::Boolean(b) => Ok(Value::Json(b.to_string())),
            Value::Real(r) => match serde_json::Number::from_f64(r) {
                Some(number) => Ok(Value::Json(number.to_string())),
                None => bail!("non-finite number {} cannot be stored as JSON", r),
            },
            Value::Blob(_) => bail!("blob value cannot be stored as JSON"),
        },
        None => Ok(match value {
            Value::Text(text) if detect_json && looks_like_json(&text) => {
                if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
                    Value::Json(text)
                } else {
                    Value::Text(text)
                }
            }
            other => other,
        }),
    }
}

/// Build the INSERT for one source row
///
/// The key column and excluded columns never reach the column list.
pub fn plan_insert(table: &TableConfig, row: Row, detect_json: bool) -> Result<InsertPlan> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for field in row {
        if table.is_excluded(&field.name) {
            continue;
        }

        let value = prepare_value(field.value, table.hint(&field.name), detect_json)
            .map_err(|e| e.context(format!("column {}", field.name)))?;
        columns.push(field.name);
        values.push(value);
    }

    let sql = build_insert_sql(&table.name, &columns, &values, None, &BTreeMap::new());

    Ok(InsertPlan {
        table: table.name.clone(),
        sql,
        columns,
        values,
        returning: None,
    })
}

fn build_insert_sql(
    table: &str,
    columns: &[String],
    values: &[Value],
    returning: Option<&str>,
    casts: &BTreeMap<usize, String>,
) -> String {
    let returning = returning
        .map(|column| format!(" RETURNING {}", quote_ident(column)))
        .unwrap_or_default();

    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES{}", quote_ident(table), returning);
    }

    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(idx, value)| match casts.get(&idx) {
            Some(type_name) => format!("${}::text::{}", idx + 1, type_name),
            None if value.is_json() => format!("${}::{}", idx + 1, JSON_CAST),
            None => format!("${}", idx + 1),
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        quote_ident(table),
        column_list.join(", "),
        placeholders.join(", "),
        returning
    )
}
