//! Entry point for the request layer.
//!
//! The orchestrator opens both sides for one operation, hands them to the
//! comparator or executor, closes them on every exit path and scrubs
//! credentials from whatever it returns. Failures before any table is
//! processed (a side failing to connect, table listing failing) are returned
//! as the request's error; everything after that is reported per table.

use crate::config::SyncSettings;
use crate::db::{Connection, ConnectionManager, DriverRegistry, SchemaIntrospector};
use crate::error::{SyncError, SyncOutcome, scrub_secret};
use crate::models::{ConnectionCheck, ConnectionConfig, SyncResult, TableCompareResult};
use crate::sync::comparator::TableComparator;
use crate::sync::executor::SyncExecutor;
use crate::sync::tables::{TableRef, resolve_tables, shared_tables};
use crate::sync::workers::until_cancelled;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Orchestrator {
    manager: ConnectionManager,
    settings: SyncSettings,
    local: ConnectionConfig,
}

/// Both sides of one operation.
struct Pair {
    local: Arc<Connection>,
    remote: Arc<Connection>,
}

impl Pair {
    async fn close(&self) {
        tokio::join!(self.local.close(), self.remote.close());
    }
}

impl Orchestrator {
    /// `local` is the fixed source endpoint used by [`compare`](Self::compare)
    /// and [`execute`](Self::execute).
    pub fn new(
        registry: Arc<DriverRegistry>,
        settings: SyncSettings,
        local: ConnectionConfig,
    ) -> Self {
        Self {
            manager: ConnectionManager::new(registry, settings),
            settings,
            local,
        }
    }

    pub fn registry(&self) -> &DriverRegistry {
        self.manager.registry()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn local_endpoint(&self) -> &ConnectionConfig {
        &self.local
    }

    /// Open, probe and close a connection.
    pub async fn test_connection(
        &self,
        config: &ConnectionConfig,
        cancel: &CancellationToken,
    ) -> SyncOutcome<ConnectionCheck> {
        let span = info_span!("test_connection", operation_id = %Uuid::new_v4());
        async move {
            let conn = until_cancelled(cancel, "test connection", self.manager.validate(config))
                .await
                .map_err(|e| e.scrubbed(config.password()))?;

            let check = ConnectionCheck {
                db_type: conn.database_type().as_str(),
                endpoint: conn.label().to_string(),
                server_version: conn.server_version().map(str::to_string),
            };
            conn.close().await;
            info!(endpoint = %check.endpoint, "Connection test passed");
            Ok(check)
        }
        .instrument(span)
        .await
    }

    /// Compare the local endpoint with `remote`.
    pub async fn compare(
        &self,
        remote: &ConnectionConfig,
        tables: Option<Vec<String>>,
        cancel: &CancellationToken,
    ) -> SyncOutcome<Vec<TableCompareResult>> {
        self.compare_pair(&self.local, remote, tables, cancel).await
    }

    /// Compare row counts of `tables` on both endpoints.
    ///
    /// Without a table list, the tables present on both sides are compared,
    /// in local order.
    pub async fn compare_pair(
        &self,
        local: &ConnectionConfig,
        remote: &ConnectionConfig,
        tables: Option<Vec<String>>,
        cancel: &CancellationToken,
    ) -> SyncOutcome<Vec<TableCompareResult>> {
        let span = info_span!("compare", operation_id = %Uuid::new_v4());
        async move {
            let pair = self.open_pair(local, remote, cancel).await?;
            let outcome = self.compare_tables(&pair, tables, cancel).await;
            pair.close().await;

            let scrub = |msg: &str| scrub_both(msg, local, remote);
            match outcome {
                Ok(mut results) => {
                    for result in &mut results {
                        if !result.error_message.is_empty() {
                            result.error_message = scrub(&result.error_message);
                        }
                    }
                    Ok(results)
                }
                Err(e) => Err(scrub_error(e, local, remote)),
            }
        }
        .instrument(span)
        .await
    }

    async fn compare_tables(
        &self,
        pair: &Pair,
        tables: Option<Vec<String>>,
        cancel: &CancellationToken,
    ) -> SyncOutcome<Vec<TableCompareResult>> {
        let (local, remote) = list_both(pair, cancel).await?;
        let tables = match tables {
            Some(tables) => resolve_tables(tables, &local, &remote),
            None => shared_tables(&local, &remote),
        };
        info!(tables = tables.len(), "Comparing tables");
        let comparator = TableComparator::new(self.settings.max_concurrent_tables);
        Ok(comparator
            .compare(pair.local.clone(), pair.remote.clone(), tables, cancel)
            .await)
    }

    /// Copy `tables` from the local endpoint to `remote`.
    pub async fn execute(
        &self,
        remote: &ConnectionConfig,
        tables: Vec<String>,
        cancel: &CancellationToken,
    ) -> SyncOutcome<Vec<SyncResult>> {
        self.execute_pair(&self.local, remote, tables, cancel).await
    }

    /// Copy `tables` from `source` to `target`, one result per requested
    /// table in request order.
    pub async fn execute_pair(
        &self,
        source: &ConnectionConfig,
        target: &ConnectionConfig,
        tables: Vec<String>,
        cancel: &CancellationToken,
    ) -> SyncOutcome<Vec<SyncResult>> {
        if tables.is_empty() {
            return Err(SyncError::invalid_input(
                "tables must name at least one table to sync",
            ));
        }

        let span = info_span!("execute", operation_id = %Uuid::new_v4());
        async move {
            let pair = self.open_pair(source, target, cancel).await?;
            let tables = match resolve_pair_tables(&pair, tables, cancel).await {
                Ok(tables) => tables,
                Err(e) => {
                    pair.close().await;
                    return Err(scrub_error(e, source, target));
                }
            };
            info!(tables = tables.len(), "Syncing tables");

            let executor = SyncExecutor::new(&self.settings);
            let mut results = executor
                .execute(pair.local.clone(), pair.remote.clone(), tables, cancel)
                .await;
            pair.close().await;

            for result in &mut results {
                if !result.error_message.is_empty() {
                    result.error_message = scrub_both(&result.error_message, source, target);
                }
            }

            let failed = results.iter().filter(|r| !r.success).count();
            let synced: u64 = results.iter().map(|r| r.synced_count).sum();
            info!(
                tables = results.len(),
                failed,
                rows = synced,
                "Sync finished"
            );
            Ok(results)
        }
        .instrument(span)
        .await
    }

    /// Open both sides concurrently. If either fails, the other is closed.
    async fn open_pair(
        &self,
        local: &ConnectionConfig,
        remote: &ConnectionConfig,
        cancel: &CancellationToken,
    ) -> SyncOutcome<Pair> {
        let (local_conn, remote_conn) = tokio::join!(
            until_cancelled(cancel, "connect local", self.manager.validate(local)),
            until_cancelled(cancel, "connect remote", self.manager.validate(remote)),
        );

        match (local_conn, remote_conn) {
            (Ok(local_conn), Ok(remote_conn)) => Ok(Pair {
                local: Arc::new(local_conn),
                remote: Arc::new(remote_conn),
            }),
            (Ok(local_conn), Err(e)) => {
                local_conn.close().await;
                let e = scrub_error(e, local, remote);
                warn!(side = "remote", error = %e, "Connection failed");
                Err(e)
            }
            (Err(e), remote_conn) => {
                if let Ok(remote_conn) = remote_conn {
                    remote_conn.close().await;
                }
                let e = scrub_error(e, local, remote);
                warn!(side = "local", error = %e, "Connection failed");
                Err(e)
            }
        }
    }
}

async fn resolve_pair_tables(
    pair: &Pair,
    tables: Vec<String>,
    cancel: &CancellationToken,
) -> SyncOutcome<Vec<TableRef>> {
    let (local, remote) = list_both(pair, cancel).await?;
    Ok(resolve_tables(tables, &local, &remote))
}

/// Base tables of both sides.
async fn list_both(
    pair: &Pair,
    cancel: &CancellationToken,
) -> SyncOutcome<(Vec<String>, Vec<String>)> {
    let (local, remote) = tokio::try_join!(
        until_cancelled(
            cancel,
            "list tables",
            SchemaIntrospector::list_tables(&pair.local)
        ),
        until_cancelled(
            cancel,
            "list tables",
            SchemaIntrospector::list_tables(&pair.remote)
        ),
    )?;
    debug!(local = local.len(), remote = remote.len(), "Listed tables");
    Ok((local, remote))
}

fn scrub_both(message: &str, local: &ConnectionConfig, remote: &ConnectionConfig) -> String {
    scrub_secret(&scrub_secret(message, local.password()), remote.password())
}

fn scrub_error(err: SyncError, local: &ConnectionConfig, remote: &ConnectionConfig) -> SyncError {
    err.scrubbed(local.password()).scrubbed(remote.password())
}
