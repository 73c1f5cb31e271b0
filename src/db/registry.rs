//! Process-wide map from `db_type` identifiers to connectors.

use crate::db::connector::Connector;
use crate::db::{MySqlConnector, PostgresConnector, SqliteConnector};
use crate::error::{SyncError, SyncOutcome};
use crate::models::DatabaseType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registered connectors, built once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    connectors: HashMap<DatabaseType, Arc<dyn Connector>>,
}

impl DriverRegistry {
    /// An empty registry; every lookup fails with `UnsupportedEngine`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every connector compiled into this build.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Arc::new(MySqlConnector))
            .register(Arc::new(PostgresConnector))
            .register(Arc::new(SqliteConnector))
    }

    /// Add a connector, replacing any previous one for the same engine.
    pub fn register(mut self, connector: Arc<dyn Connector>) -> Self {
        let db_type = connector.database_type();
        debug!(db_type = %db_type, "Registered connector");
        self.connectors.insert(db_type, connector);
        self
    }

    /// Find the connector for a request's `db_type` (aliases accepted).
    pub fn resolve(&self, db_type: &str) -> SyncOutcome<Arc<dyn Connector>> {
        DatabaseType::parse(db_type)
            .and_then(|t| self.connectors.get(&t))
            .cloned()
            .ok_or_else(|| SyncError::unsupported_engine(db_type))
    }

    /// Canonical identifiers of the registered engines, sorted.
    pub fn supported_engines(&self) -> Vec<&'static str> {
        let mut engines: Vec<_> = self.connectors.keys().map(|t| t.as_str()).collect();
        engines.sort_unstable();
        engines
    }
}
