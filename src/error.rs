//! Error types for the sync server.
//!
//! This module defines all error types using `thiserror`. Every failure that
//! leaves the process (HTTP envelope, per-table `error_message`, log line) goes
//! through [`SyncError::scrubbed`] first so request credentials are never echoed.

use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;
use url::Url;

/// Replacement text for redacted credentials.
pub const REDACTED: &str = "****";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unsupported database engine: '{db_type}'")]
    UnsupportedEngine { db_type: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Schema error: {message} (table: {table})")]
    Schema { message: String, table: String },

    #[error("Query failed: {message}{}", sql_state_suffix(sql_state))]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Write failed: {message}{}", sql_state_suffix(sql_state))]
    Write {
        message: String,
        sql_state: Option<String>,
    },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Timeout: {operation}{}", limit_suffix(limit_secs))]
    Timeout {
        operation: String,
        /// Limit that was exceeded, when the caller knows it
        limit_secs: Option<u64>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn limit_suffix(limit_secs: &Option<u64>) -> String {
    match limit_secs {
        Some(secs) => format!(" exceeded {}s", secs),
        None => " exceeded its limit".to_string(),
    }
}

fn sql_state_suffix(sql_state: &Option<String>) -> String {
    match sql_state {
        Some(code) => format!(" (SQLSTATE: {})", code),
        None => String::new(),
    }
}

/// Error category reported at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedEngine,
    ConnectionError,
    SchemaError,
    QueryError,
    WriteError,
    CancellationError,
    Timeout,
    InvalidInput,
    Internal,
}

impl SyncError {
    /// Create an unsupported engine error.
    pub fn unsupported_engine(db_type: impl Into<String>) -> Self {
        Self::UnsupportedEngine {
            db_type: db_type.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, table: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            table: table.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a write error with optional SQL state.
    pub fn write(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Write {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a timeout error for a known limit.
    pub fn timeout(operation: impl Into<String>, limit_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit_secs: Some(limit_secs),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map a driver error raised while writing to the target.
    ///
    /// Statement failures become `Write`; transport failures keep their
    /// connection/timeout classification.
    pub fn from_write(err: sqlx::Error) -> Self {
        match SyncError::from(err) {
            SyncError::Query { message, sql_state } => SyncError::Write { message, sql_state },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedEngine { .. } => ErrorKind::UnsupportedEngine,
            Self::Connection { .. } => ErrorKind::ConnectionError,
            Self::Schema { .. } => ErrorKind::SchemaError,
            Self::Query { .. } => ErrorKind::QueryError,
            Self::Write { .. } => ErrorKind::WriteError,
            Self::Cancelled { .. } => ErrorKind::CancellationError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::UnsupportedEngine { .. } => {
                Some("Use one of the registered engines: mysql, postgres, sqlite")
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Return a copy of this error with credentials removed from every message.
    ///
    /// `secret` is the password of the endpoint involved, if any. URL userinfo
    /// passwords are masked regardless.
    pub fn scrubbed(self, secret: Option<&str>) -> Self {
        let scrub = |s: String| scrub_secret(&s, secret);
        match self {
            Self::UnsupportedEngine { db_type } => Self::UnsupportedEngine {
                db_type: scrub(db_type),
            },
            Self::Connection {
                message,
                suggestion,
            } => Self::Connection {
                message: scrub(message),
                suggestion: scrub(suggestion),
            },
            Self::Schema { message, table } => Self::Schema {
                message: scrub(message),
                table: scrub(table),
            },
            Self::Query { message, sql_state } => Self::Query {
                message: scrub(message),
                sql_state,
            },
            Self::Write { message, sql_state } => Self::Write {
                message: scrub(message),
                sql_state,
            },
            Self::Cancelled { operation } => Self::Cancelled {
                operation: scrub(operation),
            },
            Self::Timeout {
                operation,
                limit_secs,
            } => Self::Timeout {
                operation: scrub(operation),
                limit_secs,
            },
            Self::InvalidInput { message } => Self::InvalidInput {
                message: scrub(message),
            },
            Self::Internal { message } => Self::Internal {
                message: scrub(message),
            },
        }
    }
}

/// Convert sqlx errors to SyncError.
impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => SyncError::connection(
                msg.to_string(),
                "Check the connection parameters and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                SyncError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => SyncError::query("No rows returned", None),
            // The acquire limit belongs to the pool options, not to this error
            sqlx::Error::PoolTimedOut => SyncError::Timeout {
                operation: "connection pool acquire".to_string(),
                limit_secs: None,
            },
            sqlx::Error::PoolClosed => {
                SyncError::connection("Connection pool is closed", "Retry the request")
            }
            sqlx::Error::Io(io_err) => SyncError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => SyncError::connection(
                format!("TLS error: {}", tls_err),
                "Verify the ssl_mode setting and server certificates",
            ),
            sqlx::Error::Protocol(msg) => SyncError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                SyncError::query(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                SyncError::query(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => SyncError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                SyncError::query(format!("Failed to decode column {}: {}", index, source), None)
            }
            sqlx::Error::Decode(source) => SyncError::query(format!("Decode error: {}", source), None),
            sqlx::Error::WorkerCrashed => SyncError::internal("Database worker crashed"),
            _ => SyncError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for sync operations.
pub type SyncOutcome<T> = Result<T, SyncError>;

/// Remove credentials from a message.
///
/// Passwords embedded in connection URLs are masked, then every literal
/// occurrence of `secret` is replaced.
pub fn scrub_secret(message: &str, secret: Option<&str>) -> String {
    let masked = message
        .split(' ')
        .map(redact_url_token)
        .collect::<Vec<_>>()
        .join(" ");

    match secret {
        Some(secret) if !secret.is_empty() => masked.replace(secret, REDACTED),
        _ => masked,
    }
}

fn redact_url_token(token: &str) -> Cow<'_, str> {
    if !token.contains("://") || !token.contains('@') {
        return Cow::Borrowed(token);
    }
    match Url::parse(token) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some(REDACTED));
            Cow::Owned(url.to_string())
        }
        _ => Cow::Borrowed(token),
    }
}
