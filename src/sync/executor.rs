//! Table transfer from source to target.
//!
//! Every table goes through `PENDING → INTROSPECTING → TRANSFERRING` and ends
//! `COMPLETED` or `FAILED`. Rows move in fixed-size batches; each batch is
//! committed on the target as one unit, and `synced_count` only counts
//! committed batches. A failed batch stops that table and nothing else.
//!
//! Cancellation interrupts reads and introspection, but a batch write that
//! has started always runs to its end so the count matches the target.

use crate::config::SyncSettings;
use crate::db::{Connection, SchemaIntrospector};
use crate::error::{SyncError, SyncOutcome};
use crate::models::{SyncResult, TableDescriptor, TableState};
use crate::sync::tables::TableRef;
use crate::sync::workers::{TableJob, run_bounded, until_cancelled};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Columns moved for one table, described on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub source: TableDescriptor,
    pub target: TableDescriptor,
}

impl TransferPlan {
    /// Match source columns to target columns by name (ignoring case).
    ///
    /// The shared columns keep the source's ordinal order. A primary key is
    /// kept on a side only if every one of its columns is shared.
    pub fn build(source: &TableDescriptor, target: &TableDescriptor) -> SyncOutcome<Self> {
        let shared: Vec<&str> = source
            .columns
            .iter()
            .filter(|c| target.column(&c.name).is_some())
            .map(|c| c.name.as_str())
            .collect();

        if shared.is_empty() {
            return Err(SyncError::schema(
                "Source and target have no columns in common",
                &source.table_name,
            ));
        }

        Ok(Self {
            source: keep_complete_key(source, &shared),
            target: keep_complete_key(target, &shared),
        })
    }

    /// Number of columns moved.
    pub fn width(&self) -> usize {
        self.source.columns.len()
    }
}

fn keep_complete_key(table: &TableDescriptor, shared: &[&str]) -> TableDescriptor {
    let projected = table.project(shared);
    let key_complete = table
        .primary_key()
        .iter()
        .all(|pk| shared.iter().any(|s| s.eq_ignore_ascii_case(pk)));
    if key_complete {
        projected
    } else {
        projected.without_primary_key()
    }
}

struct TransferJob {
    table: TableRef,
    duplicate: bool,
}

impl TableJob for TransferJob {
    fn table_name(&self) -> &str {
        &self.table.name
    }
}

/// Moves table data from the source connection to the target connection.
#[derive(Debug, Clone, Copy)]
pub struct SyncExecutor {
    batch_size: usize,
    max_concurrent_tables: usize,
}

impl SyncExecutor {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            max_concurrent_tables: settings.max_concurrent_tables,
        }
    }

    /// Transfer every table and return one result per requested name, in
    /// request order.
    ///
    /// A name listed more than once is transferred once; the repeats are
    /// reported as failed.
    pub async fn execute(
        &self,
        source: Arc<Connection>,
        target: Arc<Connection>,
        tables: Vec<TableRef>,
        cancel: &CancellationToken,
    ) -> Vec<SyncResult> {
        let mut seen = HashSet::new();
        let jobs: Vec<TransferJob> = tables
            .into_iter()
            .map(|table| TransferJob {
                duplicate: !seen.insert(table.name.clone()),
                table,
            })
            .collect();

        let batch_size = self.batch_size;
        run_bounded(jobs, self.max_concurrent_tables, cancel, |job| {
            let source = Arc::clone(&source);
            let target = Arc::clone(&target);
            let cancel = cancel.clone();
            async move {
                if job.duplicate {
                    return SyncResult::failed(
                        job.table.name,
                        0,
                        "Table listed more than once in the request",
                    );
                }
                TableTransfer::new(&source, &target, job.table, batch_size)
                    .run(&cancel)
                    .await
            }
        })
        .await
    }
}

/// State of one table's transfer.
struct TableTransfer<'a> {
    source: &'a Connection,
    target: &'a Connection,
    /// Name reported in results and logs
    table: String,
    source_name: String,
    target_name: String,
    batch_size: usize,
    state: TableState,
    synced: u64,
}

impl<'a> TableTransfer<'a> {
    fn new(
        source: &'a Connection,
        target: &'a Connection,
        table: TableRef,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            table: table.name,
            source_name: table.local,
            target_name: table.remote,
            batch_size,
            state: TableState::Pending,
            synced: 0,
        }
    }

    fn advance(&mut self, next: TableState) {
        debug_assert!(self.state.can_advance_to(next));
        debug!(table = %self.table, from = %self.state, to = %next, "Table state");
        self.state = next;
    }

    async fn run(mut self, cancel: &CancellationToken) -> SyncResult {
        let start = Instant::now();
        match self.transfer(cancel).await {
            Ok(()) => {
                self.advance(TableState::Completed);
                info!(
                    table = %self.table,
                    rows = self.synced,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Table synced"
                );
                SyncResult::completed(self.table, self.synced)
            }
            Err(e) => {
                self.advance(TableState::Failed);
                warn!(
                    table = %self.table,
                    rows = self.synced,
                    error = %e,
                    "Table sync failed"
                );
                SyncResult::failed(self.table, self.synced, e.to_string())
            }
        }
    }

    async fn transfer(&mut self, cancel: &CancellationToken) -> SyncOutcome<()> {
        self.advance(TableState::Introspecting);
        let source_table = until_cancelled(
            cancel,
            "introspect source",
            SchemaIntrospector::introspect(self.source, &self.source_name),
        )
        .await?;
        let target_table = until_cancelled(
            cancel,
            "introspect target",
            SchemaIntrospector::introspect(self.target, &self.target_name),
        )
        .await?;
        let plan = TransferPlan::build(&source_table, &target_table)?;

        if plan.width() < source_table.columns.len() {
            debug!(
                table = %self.table,
                skipped = source_table.columns.len() - plan.width(),
                "Source columns missing on target are not transferred"
            );
        }

        self.advance(TableState::Transferring);
        let mut offset = 0u64;
        loop {
            let rows = until_cancelled(
                cancel,
                "transfer",
                self.source.read_batch(&plan.source, offset, self.batch_size),
            )
            .await?;
            if rows.is_empty() {
                break;
            }

            if cancel.is_cancelled() {
                return Err(SyncError::cancelled("transfer"));
            }

            let read = rows.len();
            let written = self.target.write_batch(&plan.target, &rows).await?;
            self.synced += written;
            offset += read as u64;

            debug!(table = %self.table, offset, rows = written, "Batch committed");

            if read < self.batch_size {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::ColumnDescriptor;

    fn table(name: &str, columns: &[(&str, bool)]) -> TableDescriptor {
        TableDescriptor::new(
            name,
            columns
                .iter()
                .enumerate()
                .map(|(i, (col, pk))| {
                    ColumnDescriptor::new(*col, "text", true, i as u32 + 1).with_primary_key(*pk)
                })
                .collect(),
        )
    }

    #[test]
    fn test_plan_uses_shared_columns_in_source_order() {
        let source = table("users", &[("id", true), ("name", false), ("legacy", false)]);
        let target = table("users", &[("NAME", false), ("ID", true), ("created", false)]);

        let plan = TransferPlan::build(&source, &target).unwrap();
        assert_eq!(plan.source.column_names(), vec!["id", "name"]);
        assert_eq!(plan.target.column_names(), vec!["ID", "NAME"]);
        assert_eq!(plan.target.primary_key(), vec!["ID"]);
        assert_eq!(plan.width(), 2);
    }

    #[test]
    fn test_plan_drops_incomplete_key() {
        let source = table("pairs", &[("a", true), ("b", true), ("v", false)]);
        let target = table("pairs", &[("a", true), ("b", true), ("v", false)]);
        let narrowed = table("pairs", &[("a", true), ("v", false)]);

        let plan = TransferPlan::build(&source, &narrowed).unwrap();
        assert!(!plan.source.has_primary_key());
        assert_eq!(plan.target.primary_key(), vec!["a"]);

        let plan = TransferPlan::build(&source, &target).unwrap();
        assert_eq!(plan.source.primary_key(), vec!["a", "b"]);
    }

    #[test]
    fn test_plan_without_shared_columns() {
        let source = table("t", &[("x", false)]);
        let target = table("t", &[("y", false)]);
        let err = TransferPlan::build(&source, &target).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError);
    }

    #[test]
    fn test_batch_size_never_zero() {
        let settings = SyncSettings {
            batch_size: 0,
            ..SyncSettings::default()
        };
        assert_eq!(SyncExecutor::new(&settings).batch_size, 1);
    }
}
