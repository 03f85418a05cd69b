// ABOUTME: SQLite value to migration value conversion
// ABOUTME: Maps SQLite storage classes onto the closed Value variant

use crate::migration::{Row, Value};
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;

/// Convert a SQLite value to a migration value
///
/// Maps SQLite storage classes:
/// - NULL → `Null`
/// - INTEGER → `Integer`
/// - REAL → `Real`
/// - TEXT → `Text` (must be valid UTF-8)
/// - BLOB → `Blob`
///
/// SQLite has no boolean or JSON storage class; booleans arrive as integers
/// and JSON as text, which is classified later when the INSERT is planned.
///
/// # Examples
///
/// ```
/// # use sqlite_pg_migrator::sqlite::converter::sqlite_value_to_value;
/// # use sqlite_pg_migrator::migration::Value;
/// # use rusqlite::types::ValueRef;
/// let value = sqlite_value_to_value(ValueRef::Integer(42)).unwrap();
/// assert_eq!(value, Value::Integer(42));
/// ```
pub fn sqlite_value_to_value(value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Integer(i)),
        ValueRef::Real(f) => Ok(Value::Real(f)),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).context("TEXT value is not valid UTF-8")?;
            Ok(Value::Text(text.to_string()))
        }
        ValueRef::Blob(bytes) => Ok(Value::Blob(bytes.to_vec())),
    }
}

/// Convert a SQLite row into a named, ordered migration row
pub fn sqlite_row_to_row(row: &rusqlite::Row<'_>, column_names: &[String]) -> Result<Row> {
    let mut result = Row::new();

    for (idx, name) in column_names.iter().enumerate() {
        let value_ref = row
            .get_ref(idx)
            .with_context(|| format!("Failed to read column '{}'", name))?;
        let value = sqlite_value_to_value(value_ref)
            .with_context(|| format!("Failed to convert column '{}'", name))?;
        result.push(name.clone(), value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_convert_storage_classes() {
        assert_eq!(sqlite_value_to_value(ValueRef::Null).unwrap(), Value::Null);
        assert_eq!(
            sqlite_value_to_value(ValueRef::Integer(-7)).unwrap(),
            Value::Integer(-7)
        );
        assert_eq!(
            sqlite_value_to_value(ValueRef::Real(1.5)).unwrap(),
            Value::Real(1.5)
        );
        assert_eq!(
            sqlite_value_to_value(ValueRef::Text(b"{\"a\":1}")).unwrap(),
            Value::Text("{\"a\":1}".to_string())
        );
        assert_eq!(
            sqlite_value_to_value(ValueRef::Blob(&[0xde, 0xad])).unwrap(),
            Value::Blob(vec![0xde, 0xad])
        );
    }

    #[test]
    fn test_invalid_utf8_text_is_rejected() {
        let result = sqlite_value_to_value(ValueRef::Text(&[0xff, 0xfe]));
        assert!(result.is_err());
    }

    #[test]
    fn test_sqlite_row_to_row_keeps_column_order() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn
            .prepare("SELECT 1 AS id, 'Music' AS name, NULL AS slug, 2.5 AS weight")
            .unwrap();
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut rows = stmt.query([]).unwrap();
        let row = rows.next().unwrap().unwrap();

        let converted = sqlite_row_to_row(row, &names).unwrap();

        assert_eq!(
            converted.column_names().collect::<Vec<_>>(),
            vec!["id", "name", "slug", "weight"]
        );
        assert_eq!(converted.get("id"), Some(&Value::Integer(1)));
        assert_eq!(converted.get("name"), Some(&Value::Text("Music".to_string())));
        assert_eq!(converted.get("slug"), Some(&Value::Null));
        assert_eq!(converted.get("weight"), Some(&Value::Real(2.5)));
    }
}
