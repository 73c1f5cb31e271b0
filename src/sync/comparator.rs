//! Row-count comparison between the two sides.

use crate::db::{Connection, SchemaIntrospector};
use crate::error::SyncError;
use crate::models::{TableCompareResult, UNKNOWN_COUNT};
use crate::sync::tables::TableRef;
use crate::sync::workers::{run_bounded, until_cancelled};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Counts every table on both sides with bounded concurrency.
#[derive(Debug, Clone, Copy)]
pub struct TableComparator {
    max_concurrent_tables: usize,
}

impl TableComparator {
    pub fn new(max_concurrent_tables: usize) -> Self {
        Self {
            max_concurrent_tables,
        }
    }

    /// One result per table, in input order.
    ///
    /// A side whose count fails reports `-1` and the failure is described in
    /// `error_message`; the other tables are unaffected.
    pub async fn compare(
        &self,
        local: Arc<Connection>,
        remote: Arc<Connection>,
        tables: Vec<TableRef>,
        cancel: &CancellationToken,
    ) -> Vec<TableCompareResult> {
        run_bounded(tables, self.max_concurrent_tables, cancel, |table| {
            let local = Arc::clone(&local);
            let remote = Arc::clone(&remote);
            let cancel = cancel.clone();
            async move { compare_table(&local, &remote, table, &cancel).await }
        })
        .await
    }
}

async fn compare_table(
    local: &Connection,
    remote: &Connection,
    table: TableRef,
    cancel: &CancellationToken,
) -> TableCompareResult {
    let (local_count, remote_count) = tokio::join!(
        until_cancelled(
            cancel,
            "count rows",
            SchemaIntrospector::count(local, &table.local)
        ),
        until_cancelled(
            cancel,
            "count rows",
            SchemaIntrospector::count(remote, &table.remote)
        ),
    );

    let mut errors = Vec::new();
    let local_count = side_count("local", local_count, &mut errors);
    let remote_count = side_count("remote", remote_count, &mut errors);

    let result = TableCompareResult::new(table.name, local_count, remote_count);
    if errors.is_empty() {
        debug!(
            table = %result.table_name,
            local_count,
            remote_count,
            "Compared table"
        );
        result
    } else {
        let message = errors.join("; ");
        warn!(table = %result.table_name, error = %message, "Count failed");
        result.with_error(message)
    }
}

fn side_count(
    side: &str,
    count: Result<u64, SyncError>,
    errors: &mut Vec<String>,
) -> i64 {
    match count {
        Ok(n) => i64::try_from(n).unwrap_or(i64::MAX),
        Err(e) => {
            errors.push(format!("{}: {}", side, e));
            UNKNOWN_COUNT
        }
    }
}
