//! Bounded per-table worker pool.
//!
//! Each table runs as its own task; results come back over a channel tagged
//! with the input position so the caller sees them in input order. A table's
//! failure (or panic) is converted into that table's record and never reaches
//! its siblings.

use crate::error::{SyncError, SyncOutcome};
use crate::models::{SyncResult, TableCompareResult};
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A per-table record that can stand in for a worker that panicked.
pub trait TableOutcome: Send + 'static {
    fn from_panic(table: &str, message: &str) -> Self;
}

impl TableOutcome for SyncResult {
    fn from_panic(table: &str, message: &str) -> Self {
        SyncResult::failed(table, 0, format!("Internal error: worker panicked: {}", message))
    }
}

impl TableOutcome for TableCompareResult {
    fn from_panic(table: &str, message: &str) -> Self {
        TableCompareResult::failed(table, format!("Internal error: worker panicked: {}", message))
    }
}

/// One unit of per-table work.
pub trait TableJob: Send + 'static {
    fn table_name(&self) -> &str;
}

impl TableJob for String {
    fn table_name(&self) -> &str {
        self
    }
}

/// Run `work` for every job with at most `limit` jobs in flight.
///
/// Results are returned in job order. Once `cancel` fires no new job is
/// started, and jobs that never started are omitted from the output; jobs
/// already running are expected to watch `cancel` themselves.
pub async fn run_bounded<J, T, F, Fut>(
    jobs: Vec<J>,
    limit: usize,
    cancel: &CancellationToken,
    work: F,
) -> Vec<T>
where
    J: TableJob,
    T: TableOutcome,
    F: Fn(J) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, T)>();
    let total = jobs.len();
    let mut started = 0usize;

    for (index, job) in jobs.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let table = job.table_name().to_string();
        let task = work(job);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(table = %table, panic = %message, "Table worker panicked");
                    T::from_panic(&table, &message)
                }
            };
            // The receiver lives until every sender is gone
            let _ = tx.send((index, outcome));
        });
        started += 1;
    }
    drop(tx);

    if started < total {
        debug!(
            started,
            skipped = total - started,
            "Cancelled before every table started"
        );
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(started).collect();
    while let Some((index, outcome)) = rx.recv().await {
        slots[index] = Some(outcome);
    }
    slots.into_iter().flatten().collect()
}

/// Await `fut` unless `cancel` fires first.
pub async fn until_cancelled<T, Fut>(
    cancel: &CancellationToken,
    operation: &str,
    fut: Fut,
) -> SyncOutcome<T>
where
    Fut: Future<Output = SyncOutcome<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::cancelled(operation)),
        result = fut => result,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
