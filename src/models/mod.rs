//! Data models for the sync server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod schema;
pub mod sync;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionCheck, ConnectionConfig, DatabaseType, Password, SslMode};
pub use schema::{ColumnDescriptor, TableDescriptor};
pub use sync::{SyncResult, TableCompareResult, TableState, UNKNOWN_COUNT};
pub use value::{Row, SqlValue};
