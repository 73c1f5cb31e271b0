//! Configuration handling for the sync server.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::error::{SyncError, SyncOutcome};
use crate::models::ConnectionConfig;
use clap::Parser;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_MAX_CONCURRENT_TABLES: usize = 4;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_LOCAL_DB_TYPE: &str = "sqlite";
pub const DEFAULT_LOCAL_DB_NAME: &str = "local.db";

/// Port reported for the default remote endpoint when none is configured.
pub const DEFAULT_REMOTE_PORT: u16 = 5432;

/// Process-wide tunables shared by every operation.
///
/// These are fixed at startup; requests cannot override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Rows per read/write round trip during execute
    pub batch_size: usize,
    /// Upper bound on tables processed at the same time, per request
    pub max_concurrent_tables: usize,
    pub connect_timeout: Duration,
    /// Bound on any single statement (count, read, batch write)
    pub query_timeout: Duration,
    /// Bound on a whole boundary request; the operation is cancelled after it
    pub request_timeout: Duration,
}

impl SyncSettings {
    pub fn validate(&self) -> SyncOutcome<()> {
        if self.batch_size == 0 {
            return Err(SyncError::invalid_input("batch_size must be greater than 0"));
        }
        if self.max_concurrent_tables == 0 {
            return Err(SyncError::invalid_input(
                "max_concurrent_tables must be greater than 0",
            ));
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("query_timeout", self.query_timeout),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(SyncError::invalid_input(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Pool size for one side of an operation.
    pub fn pool_size(&self) -> u32 {
        u32::try_from(self.max_concurrent_tables).unwrap_or(u32::MAX)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_tables: DEFAULT_MAX_CONCURRENT_TABLES,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Default remote endpoint returned by the *get config* operation.
///
/// The password is never echoed; `has_password` tells the caller whether one
/// is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultEndpoint {
    pub db_type: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub db_name: String,
    pub ssl_mode: String,
    pub has_password: bool,
}

/// Configuration for the sync server.
#[derive(Clone, Parser)]
#[command(
    name = "db-sync-server",
    about = "Synchronize table data from a local database to a remote one over HTTP",
    version,
    author
)]
pub struct Config {
    /// HTTP host to bind to
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "SYNC_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "SYNC_HTTP_PORT")]
    pub http_port: u16,

    /// Engine of the local (source) database
    #[arg(long, default_value = DEFAULT_LOCAL_DB_TYPE, env = "LOCAL_DB_TYPE")]
    pub local_db_type: String,

    #[arg(long, default_value = "", env = "LOCAL_DB_HOST")]
    pub local_db_host: String,

    /// 0 selects the engine default
    #[arg(long, default_value_t = 0, env = "LOCAL_DB_PORT")]
    pub local_db_port: u16,

    #[arg(long, default_value = "", env = "LOCAL_DB_USER")]
    pub local_db_user: String,

    #[arg(long, env = "LOCAL_DB_PASSWORD", hide_env_values = true)]
    pub local_db_password: Option<String>,

    /// Database name, or file path for SQLite
    #[arg(long, default_value = DEFAULT_LOCAL_DB_NAME, env = "LOCAL_DB_NAME")]
    pub local_db_name: String,

    #[arg(long, env = "LOCAL_SSL_MODE")]
    pub local_ssl_mode: Option<String>,

    /// Engine of the default remote database shown by GET /config
    #[arg(long, default_value = "", env = "SYNC_DB_TYPE")]
    pub remote_db_type: String,

    #[arg(long, default_value = "", env = "SYNC_DB_HOST")]
    pub remote_db_host: String,

    /// 0 or unset reports 5432
    #[arg(long, default_value_t = 0, env = "SYNC_DB_PORT")]
    pub remote_db_port: u16,

    #[arg(long, default_value = "", env = "SYNC_DB_USER")]
    pub remote_db_user: String,

    #[arg(long, env = "SYNC_DB_PASSWORD", hide_env_values = true)]
    pub remote_db_password: Option<String>,

    #[arg(long, default_value = "", env = "SYNC_DB_NAME")]
    pub remote_db_name: String,

    #[arg(long, default_value = "", env = "SYNC_SSL_MODE")]
    pub remote_ssl_mode: String,

    /// Rows per batch during execute
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "SYNC_BATCH_SIZE")]
    pub batch_size: usize,

    /// Maximum tables processed concurrently per request
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CONCURRENT_TABLES,
        env = "SYNC_MAX_CONCURRENT_TABLES"
    )]
    pub max_concurrent_tables: usize,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "SYNC_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Statement timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "SYNC_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Whole-request timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS,
        env = "SYNC_REQUEST_TIMEOUT"
    )]
    pub request_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SYNC_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SYNC_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            local_db_type: DEFAULT_LOCAL_DB_TYPE.to_string(),
            local_db_host: String::new(),
            local_db_port: 0,
            local_db_user: String::new(),
            local_db_password: None,
            local_db_name: DEFAULT_LOCAL_DB_NAME.to_string(),
            local_ssl_mode: None,
            remote_db_type: String::new(),
            remote_db_host: String::new(),
            remote_db_port: 0,
            remote_db_user: String::new(),
            remote_db_password: None,
            remote_db_name: String::new(),
            remote_ssl_mode: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_tables: DEFAULT_MAX_CONCURRENT_TABLES,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// The fixed local endpoint every compare and execute reads from.
    pub fn local_endpoint(&self) -> ConnectionConfig {
        let mut endpoint = ConnectionConfig::new(
            self.local_db_type.clone(),
            self.local_db_host.clone(),
            self.local_db_port,
            self.local_db_user.clone(),
            self.local_db_name.clone(),
        );
        if let Some(password) = &self.local_db_password {
            endpoint = endpoint.with_password(password.clone());
        }
        if let Some(ssl_mode) = &self.local_ssl_mode {
            endpoint = endpoint.with_ssl_mode(ssl_mode.clone());
        }
        endpoint
    }

    /// Default remote endpoint, with the port falling back to 5432.
    pub fn default_endpoint(&self) -> DefaultEndpoint {
        DefaultEndpoint {
            db_type: self.remote_db_type.clone(),
            host: self.remote_db_host.clone(),
            port: if self.remote_db_port == 0 {
                DEFAULT_REMOTE_PORT
            } else {
                self.remote_db_port
            },
            user: self.remote_db_user.clone(),
            db_name: self.remote_db_name.clone(),
            ssl_mode: self.remote_ssl_mode.clone(),
            has_password: self
                .remote_db_password
                .as_deref()
                .is_some_and(|p| !p.is_empty()),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            batch_size: self.batch_size,
            max_concurrent_tables: self.max_concurrent_tables,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            query_timeout: Duration::from_secs(self.query_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

// Passwords stay out of debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_bind_addr", &self.http_bind_addr())
            .field("local", &self.local_endpoint().endpoint_label())
            .field("remote_db_type", &self.remote_db_type)
            .field("remote_db_host", &self.remote_db_host)
            .field("settings", &self.sync_settings())
            .field("log_level", &self.log_level)
            .field("json_logs", &self.json_logs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http_host, DEFAULT_HTTP_HOST);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.local_endpoint().db_type(), "sqlite");
        assert_eq!(config.local_endpoint().db_name(), "local.db");
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::try_parse_from([
            "db-sync-server",
            "--local-db-type",
            "postgres",
            "--local-db-host",
            "localhost",
            "--local-db-user",
            "app",
            "--local-db-password",
            "pw",
            "--local-db-name",
            "orange",
            "--batch-size",
            "25",
        ])
        .unwrap();
        let local = config.local_endpoint();
        assert_eq!(local.db_type(), "postgres");
        assert_eq!(local.password(), Some("pw"));
        assert_eq!(config.sync_settings().batch_size, 25);
    }

    #[test]
    fn test_default_endpoint_port_falls_back() {
        let config = Config {
            remote_db_type: "postgres".to_string(),
            remote_db_password: Some("secret".to_string()),
            ..Config::default()
        };
        let endpoint = config.default_endpoint();
        assert_eq!(endpoint.port, 5432);
        assert!(endpoint.has_password);

        let json = serde_json::to_string(&endpoint).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_debug_hides_passwords() {
        let config = Config {
            local_db_password: Some("local-secret".to_string()),
            remote_db_password: Some("remote-secret".to_string()),
            ..Config::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("local-secret"));
        assert!(!debug.contains("remote-secret"));
    }

    #[test]
    fn test_settings_validation() {
        assert!(SyncSettings::default().validate().is_ok());

        let settings = SyncSettings {
            batch_size: 0,
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SyncSettings {
            query_timeout: Duration::ZERO,
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
