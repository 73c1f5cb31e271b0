//! Schema introspection module.
//!
//! This module provides table listing, column metadata and row counts on top
//! of a [`Connection`]. Engine-specific SQL lives in the connectors; every call
//! here is bounded by the connection's statement timeout.

use crate::db::pool::Connection;
use crate::error::{SyncError, SyncOutcome};
use crate::models::TableDescriptor;
use tracing::debug;

/// Schema introspector for database introspection.
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// List the base tables visible on the connection, sorted by name.
    pub async fn list_tables(conn: &Connection) -> SyncOutcome<Vec<String>> {
        conn.run("list tables", conn.connector().list_tables(conn.pool()))
            .await
    }

    /// Describe a table's columns.
    ///
    /// A table that does not exist, or whose metadata cannot be read, fails
    /// with a schema error. Transport failures keep their own kind.
    pub async fn introspect(conn: &Connection, table: &str) -> SyncOutcome<TableDescriptor> {
        let descriptor = conn
            .run(
                "describe table",
                conn.connector().describe_table(conn.pool(), table),
            )
            .await
            .map_err(|e| match e {
                SyncError::Query { message, .. } | SyncError::Internal { message } => {
                    SyncError::schema(message, table)
                }
                other => other,
            })?;

        debug!(
            table = %table,
            side = %conn.label(),
            columns = descriptor.columns.len(),
            "Introspected table"
        );
        Ok(descriptor)
    }

    /// Count the rows of a table.
    pub async fn count(conn: &Connection, table: &str) -> SyncOutcome<u64> {
        conn.run("count rows", conn.connector().count_rows(conn.pool(), table))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::db::{ConnectionManager, DriverRegistry};
    use crate::error::ErrorKind;
    use crate::models::ConnectionConfig;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    async fn connect() -> (NamedTempFile, Connection) {
        let file = NamedTempFile::new().unwrap();
        let manager = ConnectionManager::new(
            Arc::new(DriverRegistry::with_defaults()),
            SyncSettings::default(),
        );
        let conn = manager
            .validate(&ConnectionConfig::sqlite(file.path().to_string_lossy()))
            .await
            .unwrap();
        let pool = conn.pool().as_sqlite().unwrap();
        sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO items (label) VALUES ('a'), ('b'), ('c')")
            .execute(pool)
            .await
            .unwrap();
        (file, conn)
    }

    #[tokio::test]
    async fn test_introspect_and_count() {
        let (_file, conn) = connect().await;

        assert_eq!(
            SchemaIntrospector::list_tables(&conn).await.unwrap(),
            vec!["items"]
        );
        let items = SchemaIntrospector::introspect(&conn, "items").await.unwrap();
        assert_eq!(items.column_names(), vec!["id", "label"]);
        assert_eq!(SchemaIntrospector::count(&conn, "items").await.unwrap(), 3);
        conn.close().await;
    }

    #[tokio::test]
    async fn test_missing_table() {
        let (_file, conn) = connect().await;

        let err = SchemaIntrospector::introspect(&conn, "ghost")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError);

        let err = SchemaIntrospector::count(&conn, "ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueryError);
        conn.close().await;
    }
}
