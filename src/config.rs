// ABOUTME: Migration configuration loaded from TOML or built from defaults
// ABOUTME: Enumerates tables in order with key column, column type hints and foreign keys

use crate::utils::validate_table_name;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Tables copied when no config file or `--tables` list is given, in migration order
pub const DEFAULT_TABLES: &[&str] = &[
    "categories",
    "venues",
    "announcements",
    "advertisements",
    "articles",
    "events",
    "podcasts",
    "shop_items",
    "weekly_charts",
    "volunteer_calendar",
    "pages",
    "age_gate",
    "donations",
    "purchases",
    "onboarding",
];

pub const DEFAULT_KEY_COLUMN: &str = "id";

/// Explicit type for a column, overriding JSON detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnHint {
    /// Value must parse as JSON and is bound with a `::jsonb` cast
    Json,
    /// Value is always bound as plain text, even if it looks like JSON
    Text,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    /// Column left out of every INSERT so the destination assigns identity
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default)]
    pub exclude_columns: Vec<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnHint>,
    /// Column → referenced table; values are rewritten to the keys that
    /// table received during this run
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, String>,
}

impl TableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_column: default_key_column(),
            exclude_columns: Vec::new(),
            columns: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
        }
    }

    pub fn with_hint(mut self, column: impl Into<String>, hint: ColumnHint) -> Self {
        self.columns.insert(column.into(), hint);
        self
    }

    pub fn with_foreign_key(mut self, column: impl Into<String>, table: impl Into<String>) -> Self {
        self.foreign_keys.insert(column.into(), table.into());
        self
    }

    pub fn hint(&self, column: &str) -> Option<ColumnHint> {
        self.columns.get(column).copied()
    }

    /// True for the key column and any explicitly excluded column
    pub fn is_excluded(&self, column: &str) -> bool {
        column == self.key_column || self.exclude_columns.iter().any(|c| c == column)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    /// Path to the SQLite source database
    pub source: Option<String>,
    /// PostgreSQL connection string for the destination
    pub target: Option<String>,
    /// Sniff `{`/`[`-leading text for JSON in columns without a hint
    #[serde(default = "default_detect_json")]
    pub detect_json: bool,
    #[serde(default = "default_tables")]
    pub tables: Vec<TableConfig>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source: None,
            target: None,
            detect_json: default_detect_json(),
            tables: default_tables(),
        }
    }
}

impl MigrationConfig {
    /// Check table names are valid identifiers and appear only once
    ///
    /// A foreign key must reference a table listed earlier, or one not listed
    /// at all (its values are then copied unchanged).
    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            bail!("Migration config lists no tables");
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            validate_table_name(&table.name)
                .with_context(|| format!("Invalid table name '{}'", table.name))?;
            if !seen.insert(table.name.as_str()) {
                bail!("Table '{}' is listed more than once", table.name);
            }
            if table.key_column.trim().is_empty() {
                bail!("Table '{}' has an empty key_column", table.name);
            }
        }

        for (position, table) in self.tables.iter().enumerate() {
            for (column, referenced) in &table.foreign_keys {
                validate_table_name(referenced).with_context(|| {
                    format!(
                        "Invalid table '{}' referenced by {}.{}",
                        referenced, table.name, column
                    )
                })?;
                if table.is_excluded(column) {
                    bail!(
                        "Foreign key column {}.{} is excluded from inserts",
                        table.name,
                        column
                    );
                }
                let referenced_position = self.tables.iter().position(|t| &t.name == referenced);
                if matches!(referenced_position, Some(p) if p >= position) {
                    bail!(
                        "Table '{}' must be listed before '{}', which references it through {}",
                        referenced,
                        table.name,
                        column
                    );
                }
            }
        }

        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// True if any table maps a foreign key onto `name`
    pub fn is_referenced(&self, name: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.foreign_keys.values().any(|referenced| referenced == name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Replace the table list with `names`, keeping per-table settings already configured
    pub fn select_tables(&mut self, names: &[String]) -> Result<()> {
        let selected = names
            .iter()
            .map(|name| {
                self.table(name)
                    .cloned()
                    .unwrap_or_else(|| TableConfig::new(name.clone()))
            })
            .collect();
        self.tables = selected;
        self.validate()
    }
}

/// Parse and validate a migration config from TOML text
pub fn parse_config(contents: &str) -> Result<MigrationConfig> {
    let config: MigrationConfig =
        toml::from_str(contents).context("Failed to parse migration config")?;
    config.validate()?;
    Ok(config)
}

/// Load a migration config file
pub fn load_config_from_file(path: impl AsRef<Path>) -> Result<MigrationConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("Invalid config file {}", path.display()))
}

fn default_key_column() -> String {
    DEFAULT_KEY_COLUMN.to_string()
}

fn default_detect_json() -> bool {
    true
}

fn default_tables() -> Vec<TableConfig> {
    DEFAULT_TABLES.iter().map(|name| TableConfig::new(*name)).collect()
}
