//! Connection pool management.
//!
//! This module provides connection pooling functionality using database-specific
//! pools (MySqlPool, PgPool, SqlitePool) to ensure full type support.
//!
//! A [`Connection`] is one side of one operation: it is opened by
//! [`ConnectionManager::validate`], shared by that operation's table workers,
//! and closed when the operation ends. Nothing is cached across requests.

use crate::config::SyncSettings;
use crate::db::connector::Connector;
use crate::db::registry::DriverRegistry;
use crate::error::{SyncError, SyncOutcome};
use crate::models::{ConnectionConfig, DatabaseType, Password, Row, TableDescriptor};
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }

    pub fn as_mysql(&self) -> SyncOutcome<&MySqlPool> {
        match self {
            DbPool::MySql(pool) => Ok(pool),
            other => Err(mismatched_pool(DatabaseType::MySQL, other)),
        }
    }

    pub fn as_postgres(&self) -> SyncOutcome<&PgPool> {
        match self {
            DbPool::Postgres(pool) => Ok(pool),
            other => Err(mismatched_pool(DatabaseType::PostgreSQL, other)),
        }
    }

    pub fn as_sqlite(&self) -> SyncOutcome<&SqlitePool> {
        match self {
            DbPool::SQLite(pool) => Ok(pool),
            other => Err(mismatched_pool(DatabaseType::SQLite, other)),
        }
    }
}

fn mismatched_pool(expected: DatabaseType, pool: &DbPool) -> SyncError {
    SyncError::internal(format!(
        "{} connector was handed a {} pool",
        expected,
        pool.db_type()
    ))
}

/// A validated, live connection to one endpoint.
///
/// Every call is bounded by the statement timeout, and every error leaving
/// it has the endpoint password scrubbed.
pub struct Connection {
    pool: DbPool,
    connector: Arc<dyn Connector>,
    label: String,
    secret: Option<Password>,
    query_timeout: Duration,
    server_version: Option<String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("label", &self.label)
            .field("pool", &self.pool)
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn database_type(&self) -> DatabaseType {
        self.connector.database_type()
    }

    /// Credential-free endpoint description.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// Remove this endpoint's password from an error.
    pub fn scrub(&self, err: SyncError) -> SyncError {
        err.scrubbed(self.secret.as_ref().map(Password::expose))
    }

    /// Run one database call under the statement timeout.
    pub async fn run<T, F>(&self, operation: &str, call: F) -> SyncOutcome<T>
    where
        F: Future<Output = SyncOutcome<T>>,
    {
        match timeout(self.query_timeout, call).await {
            Ok(result) => result.map_err(|e| self.scrub(e)),
            Err(_) => Err(timeout_error(operation, self.query_timeout)),
        }
    }

    pub async fn read_batch(
        &self,
        table: &TableDescriptor,
        offset: u64,
        limit: usize,
    ) -> SyncOutcome<Vec<Row>> {
        self.run(
            "batch read",
            self.connector.read_batch(&self.pool, table, offset, limit),
        )
        .await
    }

    /// Write one batch. The statement timeout is applied by the connector up
    /// to the commit, so a commit in flight is never abandoned.
    pub async fn write_batch(&self, table: &TableDescriptor, rows: &[Row]) -> SyncOutcome<u64> {
        self.connector
            .write_batch(&self.pool, table, rows, self.query_timeout)
            .await
            .map_err(|e| self.scrub(e))
    }

    /// Release every pooled connection. Safe to call more than once.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            debug!(endpoint = %self.label, "Closing connection");
            self.pool.close().await;
        }
    }
}

fn timeout_error(operation: &str, limit: Duration) -> SyncError {
    SyncError::timeout(operation, limit.as_secs())
}

/// Opens and validates connections for one operation.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    registry: Arc<DriverRegistry>,
    settings: SyncSettings,
}

impl ConnectionManager {
    pub fn new(registry: Arc<DriverRegistry>, settings: SyncSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Resolve the connector, open a pool within the connect timeout and
    /// probe it.
    ///
    /// A pool that opened but failed the probe is closed before the error is
    /// returned. Errors never contain the configured password.
    pub async fn validate(&self, config: &ConnectionConfig) -> SyncOutcome<Connection> {
        let secret = config.password().map(Password::new);
        let scrub = |e: SyncError| e.scrubbed(secret.as_ref().map(Password::expose));

        let connector = self.registry.resolve(config.db_type()).map_err(scrub)?;
        let db_type = connector.database_type();
        config.validate(db_type).map_err(scrub)?;

        let label = config.endpoint_label();
        let connect_timeout = self.settings.connect_timeout;
        let start = Instant::now();

        info!(endpoint = %label, db_type = %db_type, "Connecting to database");

        let pool = match timeout(connect_timeout, connector.open(config, &self.settings)).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => return Err(scrub(e)),
            Err(_) => {
                return Err(SyncError::connection(
                    format!(
                        "Timed out connecting to {} after {}s",
                        label,
                        connect_timeout.as_secs()
                    ),
                    "Check that the host and port are reachable or raise --connect-timeout",
                ));
            }
        };

        let probe = match timeout(connect_timeout, connector.ping(&pool)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::connection(
                format!("Liveness probe against {} timed out", label),
                "The server accepted the connection but did not answer; check its load",
            )),
        };
        if let Err(e) = probe {
            pool.close().await;
            return Err(scrub(e));
        }

        let server_version = match timeout(connect_timeout, connector.server_version(&pool)).await
        {
            Ok(Ok(version)) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Ok(Err(e)) => {
                warn!(error = %scrub(e), "Failed to get server version");
                None
            }
            Err(_) => None,
        };

        info!(
            endpoint = %label,
            server_version = ?server_version,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Connected successfully"
        );

        Ok(Connection {
            pool,
            connector,
            label,
            secret,
            query_timeout: self.settings.query_timeout,
            server_version,
        })
    }
}

/// Build a connection error with a suggestion derived from the driver error.
pub(crate) fn connection_failed(db_type: DatabaseType, error: &sqlx::Error) -> SyncError {
    SyncError::connection(
        format!("Failed to connect: {}", error),
        connection_suggestion(db_type, error),
    )
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user and password".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check the ssl_mode setting or try ssl_mode=disable".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL | DatabaseType::MySQL => format!(
            "Verify host, port ({} by default) and db_name",
            db_type.default_port().unwrap_or_default()
        ),
        DatabaseType::SQLite => {
            "Verify that db_name is the path of an existing database file".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(DriverRegistry::with_defaults()),
            SyncSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_validate_unsupported_engine() {
        let config = ConnectionConfig::new("mongo", "localhost", 27017, "root", "app")
            .with_password("mongo-secret");
        let err = manager().validate(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedEngine);
    }

    #[tokio::test]
    async fn test_validate_rejects_incomplete_config() {
        let config = ConnectionConfig::new("postgres", "", 5432, "app", "db");
        let err = manager().validate(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_validate_missing_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let config = ConnectionConfig::sqlite(path.to_string_lossy());
        let err = manager().validate(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[tokio::test]
    async fn test_validate_sqlite_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ConnectionConfig::sqlite(file.path().to_string_lossy());
        let conn = manager().validate(&config).await.unwrap();
        assert_eq!(conn.database_type(), DatabaseType::SQLite);
        assert!(conn.server_version().is_some());
        conn.close().await;
        assert!(conn.pool().is_closed());
    }

    #[test]
    fn test_connection_suggestion() {
        let err = sqlx::Error::Protocol("password authentication failed".to_string());
        assert!(connection_suggestion(DatabaseType::PostgreSQL, &err).contains("password"));

        let err = sqlx::Error::Protocol("something odd".to_string());
        assert!(connection_suggestion(DatabaseType::MySQL, &err).contains("3306"));
    }
}
