//! DB Sync Server Library
//!
//! Compares and copies table data from a local database to a remote one,
//! possibly running a different engine (SQLite, PostgreSQL, MySQL).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use error::{SyncError, SyncOutcome};
pub use sync::Orchestrator;
