//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The connector capability set and the registry that dispatches on `db_type`
//! - Connection pool management with connect/statement timeouts
//! - Schema introspection
//! - SQL dialects and type mappings
//! - One connector per supported engine

pub mod connector;
pub mod dialect;
pub mod mysql;
pub mod pool;
pub mod postgres;
pub mod registry;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use connector::Connector;
pub use mysql::MySqlConnector;
pub use pool::{Connection, ConnectionManager, DbPool};
pub use postgres::PostgresConnector;
pub use registry::DriverRegistry;
pub use schema::SchemaIntrospector;
pub use sqlite::SqliteConnector;
