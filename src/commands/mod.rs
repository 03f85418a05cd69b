// ABOUTME: Command implementations for the migration CLI
// ABOUTME: Exports the migrate and verify commands

pub mod migrate;
pub mod verify;

pub use migrate::migrate;
pub use verify::verify;
