//! Database-agnostic type mappings.
//!
//! This module provides utilities for mapping between database-specific types
//! and the engine-neutral [`SqlValue`].
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies declared column types into logical categories
//! 2. Database-specific decoders turn a fetched row into `SqlValue`s
//!
//! On the write side, [`coerce_for_target`] adjusts a value to the category of
//! the target column before the connector binds it.

use crate::error::{SyncError, SyncOutcome};
use crate::models::{DatabaseType, SqlValue, TableDescriptor};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Unknown,
}

/// Classify a declared type into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.trim().to_ascii_lowercase();

    // Composite and range types contain "int" in their names but are not integers
    if lower.ends_with("[]")
        || lower.contains("interval")
        || lower.contains("point")
        || lower.contains("range")
    {
        return TypeCategory::Unknown;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // UUID (PostgreSQL)
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower.contains("clob") {
        return TypeCategory::Text;
    }

    // Dates, times, enums, sets, geometry...
    TypeCategory::Unknown
}

/// Categories of every column of `table`, in column order.
pub fn categorize_columns(table: &TableDescriptor, db: DatabaseType) -> Vec<TypeCategory> {
    table
        .columns
        .iter()
        .map(|c| categorize_type(&c.declared_type, db))
        .collect()
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw MySQL DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Write-side Coercion
// =============================================================================

/// Adjust `value` to the category of the column it is written into.
///
/// Only conversions that are lossless across engines are applied; anything
/// else is left to the target engine, which reports a failure for the batch.
pub fn coerce_for_target(value: SqlValue, target: TypeCategory) -> SqlValue {
    match (value, target) {
        (SqlValue::Int(v), TypeCategory::Boolean) => SqlValue::Bool(v != 0),
        (SqlValue::UInt(v), TypeCategory::Boolean) => SqlValue::Bool(v != 0),
        (SqlValue::Bool(v), TypeCategory::Integer | TypeCategory::Decimal) => {
            SqlValue::Int(i64::from(v))
        }
        (SqlValue::Json(v), TypeCategory::Text | TypeCategory::Unknown) => {
            SqlValue::Text(v.to_string())
        }
        (value, _) => value,
    }
}

fn decode_error(column: &str, err: sqlx::Error) -> SyncError {
    SyncError::query(format!("Failed to decode column '{}': {}", column, err), None)
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

pub mod mysql {
    use super::*;

    /// Decode one row; `categories` follows the select-list order.
    pub fn decode_row(
        row: &MySqlRow,
        columns: &[&str],
        categories: &[TypeCategory],
    ) -> SyncOutcome<Vec<SqlValue>> {
        categories
            .iter()
            .enumerate()
            .map(|(idx, category)| {
                decode_column(row, idx, *category).map_err(|e| decode_error(columns[idx], e))
            })
            .collect()
    }

    fn decode_column(
        row: &MySqlRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<SqlValue, sqlx::Error> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(SqlValue::Null);
        }
        match category {
            TypeCategory::Decimal => Ok(SqlValue::Decimal(row.try_get::<RawDecimal, _>(idx)?.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => Ok(SqlValue::Bool(row.try_get::<bool, _>(idx)?)),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => Ok(SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            TypeCategory::Json => Ok(SqlValue::Json(row.try_get::<serde_json::Value, _>(idx)?)),
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(SqlValue::Int(v));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        // Unsigned columns
        let v = row.try_get::<u64, _>(idx)?;
        Ok(match i64::try_from(v) {
            Ok(signed) => SqlValue::Int(signed),
            Err(_) => SqlValue::UInt(v),
        })
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(SqlValue::Float(v));
        }
        Ok(SqlValue::Float(row.try_get::<f32, _>(idx)?.into()))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(SqlValue::Text(v));
        }
        // Binary collations come back as bytes
        let bytes = row.try_get::<Vec<u8>, _>(idx)?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => SqlValue::Text(s),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        })
    }
}

pub mod postgres {
    use super::*;

    /// Decode one row read through `PostgresDialect::select_expression`.
    pub fn decode_row(
        row: &PgRow,
        columns: &[&str],
        categories: &[TypeCategory],
    ) -> SyncOutcome<Vec<SqlValue>> {
        categories
            .iter()
            .enumerate()
            .map(|(idx, category)| {
                decode_column(row, idx, *category).map_err(|e| decode_error(columns[idx], e))
            })
            .collect()
    }

    fn decode_column(
        row: &PgRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<SqlValue, sqlx::Error> {
        let value = match category {
            TypeCategory::Integer => row.try_get::<Option<i64>, _>(idx)?.map(SqlValue::Int),
            TypeCategory::Float => row.try_get::<Option<f64>, _>(idx)?.map(SqlValue::Float),
            TypeCategory::Boolean => row.try_get::<Option<bool>, _>(idx)?.map(SqlValue::Bool),
            TypeCategory::Binary => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(SqlValue::Bytes),
            TypeCategory::Decimal => row.try_get::<Option<String>, _>(idx)?.map(SqlValue::Decimal),
            _ => row.try_get::<Option<String>, _>(idx)?.map(SqlValue::Text),
        };
        Ok(value.unwrap_or(SqlValue::Null))
    }
}

pub mod sqlite {
    use super::*;

    /// Decode one row by the storage class of each value.
    ///
    /// SQLite typing is per value, so the declared column type is ignored.
    pub fn decode_row(row: &SqliteRow, columns: &[&str]) -> SyncOutcome<Vec<SqlValue>> {
        (0..columns.len())
            .map(|idx| decode_column(row, idx).map_err(|e| decode_error(columns[idx], e)))
            .collect()
    }

    fn decode_column(row: &SqliteRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        let storage_class = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                return Ok(SqlValue::Null);
            }
            raw.type_info().name().to_ascii_uppercase()
        };

        // The storage class was checked above, so the declared type can be bypassed.
        Ok(match storage_class.as_str() {
            "REAL" => SqlValue::Float(row.try_get_unchecked::<f64, _>(idx)?),
            "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
            "TEXT" => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
            class if class.contains("INT") || class == "BOOLEAN" => {
                SqlValue::Int(row.try_get_unchecked::<i64, _>(idx)?)
            }
            _ => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("bigint unsigned", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("smallint", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("tinyint(1)", DatabaseType::MySQL),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_not_integer() {
        assert_eq!(
            categorize_type("interval", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("integer[]", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("int4range", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("decimal(10,2)", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("numeric(12,4)", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_misc() {
        assert_eq!(
            categorize_type("jsonb", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("character varying(255)", DatabaseType::PostgreSQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("double precision", DatabaseType::PostgreSQL),
            TypeCategory::Float
        );
        assert_eq!(
            categorize_type("varbinary(16)", DatabaseType::MySQL),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("timestamp without time zone", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::SQLite),
            TypeCategory::Boolean
        );
    }

    #[test]
    fn test_coerce_integer_into_boolean_column() {
        assert_eq!(
            coerce_for_target(SqlValue::Int(1), TypeCategory::Boolean),
            SqlValue::Bool(true)
        );
        assert_eq!(
            coerce_for_target(SqlValue::Int(0), TypeCategory::Boolean),
            SqlValue::Bool(false)
        );
    }

    #[test]
    fn test_coerce_boolean_into_integer_column() {
        assert_eq!(
            coerce_for_target(SqlValue::Bool(true), TypeCategory::Integer),
            SqlValue::Int(1)
        );
    }

    #[test]
    fn test_coerce_leaves_other_values() {
        assert_eq!(
            coerce_for_target(SqlValue::Text("x".into()), TypeCategory::Integer),
            SqlValue::Text("x".into())
        );
        assert_eq!(
            coerce_for_target(SqlValue::Null, TypeCategory::Boolean),
            SqlValue::Null
        );
        assert_eq!(
            coerce_for_target(
                SqlValue::Json(serde_json::json!({"a": 1})),
                TypeCategory::Text
            ),
            SqlValue::Text("{\"a\":1}".into())
        );
    }
}
