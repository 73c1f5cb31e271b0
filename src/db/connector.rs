//! Engine capability set.
//!
//! A [`Connector`] is everything the sync core needs from one database
//! engine. Adding an engine means implementing this trait and registering it
//! with the [`DriverRegistry`](crate::db::DriverRegistry); nothing else
//! branches on the engine kind.

use crate::config::SyncSettings;
use crate::db::pool::DbPool;
use crate::error::{SyncError, SyncOutcome};
use crate::models::{ConnectionConfig, DatabaseType, Row, TableDescriptor};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    fn database_type(&self) -> DatabaseType;

    /// Open a pool for `config`, sized from `settings`.
    ///
    /// Fails with a connection error when the endpoint is unreachable or
    /// rejects the credentials.
    async fn open(&self, config: &ConnectionConfig, settings: &SyncSettings)
    -> SyncOutcome<DbPool>;

    /// Trivial round trip used as a liveness probe.
    async fn ping(&self, pool: &DbPool) -> SyncOutcome<()>;

    async fn server_version(&self, pool: &DbPool) -> SyncOutcome<String>;

    /// Base tables visible in the connected database/schema, sorted by name.
    async fn list_tables(&self, pool: &DbPool) -> SyncOutcome<Vec<String>>;

    async fn count_rows(&self, pool: &DbPool, table: &str) -> SyncOutcome<u64>;

    /// Columns of `table` in ordinal order. Fails with a schema error when the
    /// table does not exist.
    async fn describe_table(&self, pool: &DbPool, table: &str) -> SyncOutcome<TableDescriptor>;

    /// Read up to `limit` rows starting at `offset`, in a stable order.
    /// Values follow the column order of `table`.
    async fn read_batch(
        &self,
        pool: &DbPool,
        table: &TableDescriptor,
        offset: u64,
        limit: usize,
    ) -> SyncOutcome<Vec<Row>>;

    /// Write `rows` into `table` as one all-or-nothing unit and return the
    /// number of rows written. Upserts when `table` has a primary key.
    ///
    /// `statement_timeout` bounds everything before the commit; a batch that
    /// runs out of time is rolled back. The commit itself is never abandoned.
    async fn write_batch(
        &self,
        pool: &DbPool,
        table: &TableDescriptor,
        rows: &[Row],
        statement_timeout: Duration,
    ) -> SyncOutcome<u64>;
}

/// Reject rows whose width differs from the descriptor they are written with.
pub(crate) fn check_row_width(table: &TableDescriptor, rows: &[Row]) -> SyncOutcome<()> {
    let width = table.columns.len();
    match rows.iter().position(|row| row.len() != width) {
        Some(index) => Err(SyncError::internal(format!(
            "Row {} of batch for '{}' has {} values, expected {}",
            index,
            table.table_name,
            rows[index].len(),
            width
        ))),
        None => Ok(()),
    }
}

/// Time budget for the uncommitted part of one batch write.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteDeadline {
    at: Instant,
    limit: Duration,
}

impl WriteDeadline {
    pub(crate) fn starting_now(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    /// Run one pre-commit step. On expiry the step is dropped, and with it the
    /// open transaction.
    pub(crate) async fn bound<T, F>(&self, step: F) -> SyncOutcome<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout_at(self.at, step).await {
            Ok(result) => result.map_err(SyncError::from_write),
            Err(_) => Err(SyncError::timeout("batch write", self.limit.as_secs())),
        }
    }
}
