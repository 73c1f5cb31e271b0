//! Synchronization engine.
//!
//! - `workers`: bounded, cancellable, order-preserving per-table task pool
//! - `tables`: matching table names across the two sides
//! - `comparator`: row-count comparison
//! - `executor`: batched transfer with per-table isolation
//! - `orchestrator`: the façade the request layer calls

pub mod comparator;
pub mod executor;
pub mod orchestrator;
pub mod tables;
pub mod workers;

pub use comparator::TableComparator;
pub use executor::{SyncExecutor, TransferPlan};
pub use orchestrator::Orchestrator;
pub use tables::TableRef;
