// ABOUTME: Migration core module
// ABOUTME: Row model, INSERT planning, key remapping, the table copy loop and its outcome reports

pub mod keys;
pub mod migrator;
pub mod plan;
pub mod report;
pub mod value;

pub use keys::{KeyMap, KeyMaps};
pub use migrator::{Destination, Migrator, Source, ERROR_PREVIEW_CHARS, MAX_LOGGED_ERRORS};
pub use plan::{looks_like_json, plan_insert, prepare_value, InsertPlan};
pub use report::{MigrationRun, RowFailure, RowOutcome, TableOutcome, TableReport, TableResult};
pub use value::{Field, Row, Value};
