//! Connection-related data models.
//!
//! This module defines the endpoint configuration supplied with each request
//! and the engine identifiers the driver registry understands.

use crate::error::{SyncError, SyncOutcome};
use serde::{Deserialize, Deserializer, Serialize};
use zeroize::Zeroizing;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse a `db_type` identifier, accepting common aliases.
    pub fn parse(db_type: &str) -> Option<Self> {
        match db_type.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" | "sqlite3" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Canonical identifier used in requests and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }

    /// File-based engines ignore host, port and credentials.
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::SQLite)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// TLS negotiation mode, using PostgreSQL's vocabulary for every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    /// Parse an `ssl_mode` value. Empty means "engine default" and yields `None`.
    pub fn parse(value: &str) -> SyncOutcome<Option<Self>> {
        let mode = match value.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "disable" | "disabled" => Self::Disable,
            "allow" => Self::Allow,
            "prefer" | "preferred" => Self::Prefer,
            "require" | "required" => Self::Require,
            "verify-ca" | "verify_ca" => Self::VerifyCa,
            "verify-full" | "verify_full" | "verify-identity" | "verify_identity" => {
                Self::VerifyFull
            }
            other => {
                return Err(SyncError::invalid_input(format!(
                    "Unknown ssl_mode '{}'. Expected one of: disable, allow, prefer, require, verify-ca, verify-full",
                    other
                )));
            }
        };
        Ok(Some(mode))
    }
}

/// A database password. Zeroed on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(Zeroizing<String>);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the plain-text value. Only connectors and scrubbing may call this.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(****)")
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Password::new)
    }
}

/// Configuration for one database endpoint (source or target).
///
/// Built by the request boundary and never persisted. Fields are private so a
/// config cannot change after it has been validated.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    db_type: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    user: String,
    /// Contains sensitive data - never serialized or logged
    #[serde(default, skip_serializing)]
    password: Option<Password>,
    /// Database name; the file path for SQLite
    #[serde(default)]
    db_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ssl_mode: Option<String>,
}

impl ConnectionConfig {
    /// Create a new connection configuration without password or TLS mode.
    pub fn new(
        db_type: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        db_name: impl Into<String>,
    ) -> Self {
        Self {
            db_type: db_type.into(),
            host: host.into(),
            port,
            user: user.into(),
            password: None,
            db_name: db_name.into(),
            ssl_mode: None,
        }
    }

    /// Configuration for a SQLite database file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new("sqlite", "", 0, "", path)
    }

    /// Set the password. An empty value means passwordless authentication.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = Password::new(password);
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    /// Set the TLS mode. An empty value means the engine default.
    pub fn with_ssl_mode(mut self, ssl_mode: impl Into<String>) -> Self {
        let ssl_mode = ssl_mode.into();
        self.ssl_mode = (!ssl_mode.trim().is_empty()).then_some(ssl_mode);
        self
    }

    pub fn db_type(&self) -> &str {
        &self.db_type
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The configured port, or `default` when the request left it at zero.
    pub fn port_or(&self, default: u16) -> u16 {
        if self.port == 0 { default } else { self.port }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The plain-text password, `None` for passwordless/trusted auth.
    pub fn password(&self) -> Option<&str> {
        self.password
            .as_ref()
            .map(Password::expose)
            .filter(|p| !p.is_empty())
    }

    pub fn has_password(&self) -> bool {
        self.password().is_some()
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Parsed TLS mode; `None` means the engine default.
    pub fn ssl_mode(&self) -> SyncOutcome<Option<SslMode>> {
        match self.ssl_mode.as_deref() {
            Some(mode) => SslMode::parse(mode),
            None => Ok(None),
        }
    }

    /// Credential-free description of the endpoint for logs and messages.
    pub fn endpoint_label(&self) -> String {
        if self.host.is_empty() {
            format!("{}:{}", self.db_type, self.db_name)
        } else {
            format!(
                "{}://{}:{}/{}",
                self.db_type, self.host, self.port, self.db_name
            )
        }
    }

    /// Check that the fields required by `db_type` are present.
    pub fn validate(&self, db_type: DatabaseType) -> SyncOutcome<()> {
        if self.db_name.trim().is_empty() {
            return Err(SyncError::invalid_input(if db_type.is_file_based() {
                "db_name must be the path of the database file"
            } else {
                "db_name is required"
            }));
        }
        if !db_type.is_file_based() {
            if self.host.trim().is_empty() {
                return Err(SyncError::invalid_input(format!(
                    "host is required for {}",
                    db_type
                )));
            }
            if self.user.trim().is_empty() {
                return Err(SyncError::invalid_input(format!(
                    "user is required for {}",
                    db_type
                )));
            }
        }
        self.ssl_mode()?;
        Ok(())
    }
}

/// Result of a successful connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCheck {
    /// Canonical engine identifier
    pub db_type: &'static str,
    /// Credential-free endpoint description
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
}
