// ABOUTME: PostgreSQL destination module
// ABOUTME: Exports connection management, parameter encoding and the transactional writer

pub mod connection;
pub mod params;
pub mod writer;

pub use connection::connect;
pub use params::SqlParam;
pub use writer::PostgresDestination;
