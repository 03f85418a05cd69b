// ABOUTME: Tracks the keys the destination assigned to each migrated row
// ABOUTME: Rewrites foreign key columns of later tables from source keys to destination keys

use crate::config::TableConfig;
use crate::migration::value::{Row, Value};
use std::collections::HashMap;

/// Source key → destination key for one table
///
/// Keys are compared by their text form, so an integer `3` and a text `"3"`
/// from a loosely typed SQLite column refer to the same row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyMap {
    keys: HashMap<String, Value>,
}

fn lookup_key(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Blob(_) => None,
        other => Some(other.to_string()),
    }
}

impl KeyMap {
    pub fn insert(&mut self, source_key: &Value, destination_key: Value) {
        if let Some(key) = lookup_key(source_key) {
            self.keys.insert(key, destination_key);
        }
    }

    pub fn get(&self, source_key: &Value) -> Option<&Value> {
        lookup_key(source_key).and_then(|key| self.keys.get(&key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Key maps of every table committed so far in a run
#[derive(Debug, Default)]
pub struct KeyMaps {
    tables: HashMap<String, KeyMap>,
}

impl KeyMaps {
    pub fn register(&mut self, table: impl Into<String>, keys: KeyMap) {
        self.tables.insert(table.into(), keys);
    }

    pub fn get(&self, table: &str) -> Option<&KeyMap> {
        self.tables.get(table)
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// Referenced tables of `table` that have no key map in this run
    pub fn missing_parents<'a>(&self, table: &'a TableConfig) -> Vec<&'a str> {
        let mut missing: Vec<&str> = table
            .foreign_keys
            .values()
            .map(String::as_str)
            .filter(|parent| !self.tables.contains_key(*parent))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Rewrite the foreign key columns of `row` in place
    ///
    /// Non-null values found in the parent's map take the destination key.
    /// Values with no match become NULL. Columns whose parent has no map are
    /// left as they are. Returns how many values were set to NULL.
    pub fn remap_row(&self, table: &TableConfig, row: &mut Row) -> usize {
        let mut unmapped = 0;

        for (column, parent) in &table.foreign_keys {
            let Some(keys) = self.tables.get(parent) else {
                continue;
            };
            let Some(value) = row.get_mut(column) else {
                continue;
            };
            if *value == Value::Null {
                continue;
            }

            *value = match keys.get(value) {
                Some(destination_key) => destination_key.clone(),
                None => {
                    unmapped += 1;
                    Value::Null
                }
            };
        }

        unmapped
    }
}
