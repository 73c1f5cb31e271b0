//! Engine-neutral row values moved between connectors.

use serde_json::Value as JsonValue;

/// A single column value read from a source row.
///
/// Types without a lossless native mapping (dates, intervals, enums, ...) travel
/// as `Text` in the engine's canonical text form and are converted back by the
/// target.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact numeric kept as its decimal text
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

/// One row, values in descriptor column order.
pub type Row = Vec<SqlValue>;
