//! Per-table outcome records returned by compare and execute.

use serde::Serialize;

/// Count reported for a side whose row count could not be read.
pub const UNKNOWN_COUNT: i64 = -1;

/// Row counts of one table on both sides.
///
/// Equal counts do not prove equal rows; this is only a divergence signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCompareResult {
    pub table_name: String,
    /// `-1` when the count failed
    pub local_count: i64,
    /// `-1` when the count failed
    pub remote_count: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl TableCompareResult {
    pub fn new(table_name: impl Into<String>, local_count: i64, remote_count: i64) -> Self {
        Self {
            table_name: table_name.into(),
            local_count,
            remote_count,
            error_message: String::new(),
        }
    }

    /// Attach a failure message (counts that failed should already be `UNKNOWN_COUNT`).
    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = error_message.into();
        self
    }

    /// A table whose comparison failed on both sides.
    pub fn failed(table_name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self::new(table_name, UNKNOWN_COUNT, UNKNOWN_COUNT).with_error(error_message)
    }

    pub fn is_complete(&self) -> bool {
        self.local_count != UNKNOWN_COUNT && self.remote_count != UNKNOWN_COUNT
    }

    pub fn is_diverged(&self) -> bool {
        self.is_complete() && self.local_count != self.remote_count
    }
}

/// Outcome of transferring one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub table_name: String,
    /// Rows committed to the target, not rows read from the source
    pub synced_count: u64,
    pub success: bool,
    /// Empty when `success` is true
    pub error_message: String,
}

impl SyncResult {
    pub fn completed(table_name: impl Into<String>, synced_count: u64) -> Self {
        Self {
            table_name: table_name.into(),
            synced_count,
            success: true,
            error_message: String::new(),
        }
    }

    pub fn failed(
        table_name: impl Into<String>,
        synced_count: u64,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            synced_count,
            success: false,
            error_message: error_message.into(),
        }
    }
}

/// Lifecycle of one table during execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Pending,
    Introspecting,
    Transferring,
    Completed,
    Failed,
}

impl TableState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` follows
    /// `PENDING → INTROSPECTING → TRANSFERRING → {COMPLETED | FAILED}`.
    /// Any non-terminal state may fail.
    pub fn can_advance_to(&self, next: TableState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Introspecting)
                | (Self::Introspecting, Self::Transferring)
                | (Self::Transferring, Self::Completed)
        ) || (!self.is_terminal() && next == Self::Failed)
    }
}

impl std::fmt::Display for TableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Introspecting => "INTROSPECTING",
            Self::Transferring => "TRANSFERRING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
