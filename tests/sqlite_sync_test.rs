//! Integration tests for compare and execute between two SQLite files.
//!
//! Both sides are real database files so each side can hold a multi-connection
//! pool; `:memory:` would give every connection its own database.

use db_sync_server::config::SyncSettings;
use db_sync_server::db::DriverRegistry;
use db_sync_server::error::ErrorKind;
use db_sync_server::models::ConnectionConfig;
use db_sync_server::sync::Orchestrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;

/// A SQLite file that is removed when dropped.
struct TestDb {
    path: TempPath,
    pool: SqlitePool,
}

impl TestDb {
    async fn new() -> Self {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        Self { path, pool }
    }

    fn config(&self) -> ConnectionConfig {
        ConnectionConfig::sqlite(self.path.to_str().unwrap())
    }

    async fn exec(&self, sql: &str) {
        sqlx::query(sql).execute(&self.pool).await.unwrap();
    }

    /// Insert `count` rows `(id, name)` with ids starting at 1.
    async fn fill(&self, table: &str, count: i64) {
        let mut tx = self.pool.begin().await.unwrap();
        for id in 1..=count {
            sqlx::query(&format!("INSERT INTO {} (id, name) VALUES (?1, ?2)", table))
                .bind(id)
                .bind(format!("{}-{}", table, id))
                .execute(&mut *tx)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
    }

    async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn orchestrator(batch_size: usize) -> Orchestrator {
    let settings = SyncSettings {
        batch_size,
        ..SyncSettings::default()
    };
    Orchestrator::new(
        Arc::new(DriverRegistry::with_defaults()),
        settings,
        ConnectionConfig::sqlite("unused.db"),
    )
}

const USERS: &str = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)";
const ORDERS: &str = "CREATE TABLE orders (id INTEGER PRIMARY KEY, name TEXT NOT NULL)";

#[tokio::test]
async fn test_compare_reports_counts_in_request_order() {
    let local = TestDb::new().await;
    let remote = TestDb::new().await;
    for db in [&local, &remote] {
        db.exec(USERS).await;
        db.exec(ORDERS).await;
    }
    local.fill("users", 100).await;
    local.fill("orders", 50).await;
    remote.fill("users", 98).await;
    remote.fill("orders", 50).await;

    let results = orchestrator(500)
        .compare_pair(
            &local.config(),
            &remote.config(),
            Some(vec!["users".to_string(), "orders".to_string()]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].table_name, "users");
    assert_eq!((results[0].local_count, results[0].remote_count), (100, 98));
    assert!(results[0].is_diverged());
    assert_eq!(results[1].table_name, "orders");
    assert_eq!((results[1].local_count, results[1].remote_count), (50, 50));
    assert!(results[1].error_message.is_empty());
}

#[tokio::test]
async fn test_compare_defaults_to_shared_tables() {
    let local = TestDb::new().await;
    let remote = TestDb::new().await;
    local.exec(USERS).await;
    local.exec(ORDERS).await;
    local.exec("CREATE TABLE audit (id INTEGER PRIMARY KEY, name TEXT)").await;
    remote.exec(USERS).await;
    remote.exec(ORDERS).await;
    local.fill("orders", 3).await;

    let results = orchestrator(500)
        .compare_pair(
            &local.config(),
            &remote.config(),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let names: Vec<_> = results.iter().map(|r| r.table_name.as_str()).collect();
    assert_eq!(names, vec!["orders", "users"]);
    assert_eq!((results[0].local_count, results[0].remote_count), (3, 0));
}

#[tokio::test]
async fn test_compare_missing_table_reports_unknown_count() {
    let local = TestDb::new().await;
    let remote = TestDb::new().await;
    local.exec(USERS).await;
    local.fill("users", 5).await;

    let results = orchestrator(500)
        .compare_pair(
            &local.config(),
            &remote.config(),
            Some(vec!["users".to_string()]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results[0].local_count, 5);
    assert_eq!(results[0].remote_count, -1);
    assert!(results[0].error_message.starts_with("remote:"));
}

#[tokio::test]
async fn test_execute_copies_every_batch() {
    let source = TestDb::new().await;
    let target = TestDb::new().await;
    source.exec(USERS).await;
    target.exec(USERS).await;
    source.fill("users", 100).await;

    let results = orchestrator(25)
        .execute_pair(
            &source.config(),
            &target.config(),
            vec!["users".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].table_name, "users");
    assert_eq!(results[0].synced_count, 100);
    assert!(results[0].success);
    assert_eq!(results[0].error_message, "");
    assert_eq!(target.count("users").await, 100);
}

#[tokio::test]
async fn test_execute_stops_at_failed_batch() {
    let source = TestDb::new().await;
    let target = TestDb::new().await;
    source.exec(USERS).await;
    target
        .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, CHECK (id <= 20 OR id > 30))")
        .await;
    source.fill("users", 40).await;

    let results = orchestrator(10)
        .execute_pair(
            &source.config(),
            &target.config(),
            vec!["users".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!results[0].success);
    assert_eq!(results[0].synced_count, 20);
    assert!(results[0].error_message.starts_with("Write failed"));
    assert_eq!(target.count("users").await, 20);
}

#[tokio::test]
async fn test_execute_isolates_table_failures() {
    let source = TestDb::new().await;
    let target = TestDb::new().await;
    source.exec(USERS).await;
    source.exec(ORDERS).await;
    target.exec(ORDERS).await;
    source.fill("users", 10).await;
    source.fill("orders", 7).await;

    let results = orchestrator(500)
        .execute_pair(
            &source.config(),
            &target.config(),
            vec!["users".to_string(), "orders".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results[0].table_name, "users");
    assert!(!results[0].success);
    assert_eq!(results[0].synced_count, 0);
    assert!(results[0].error_message.starts_with("Schema error"));

    assert_eq!(results[1].table_name, "orders");
    assert!(results[1].success);
    assert_eq!(results[1].synced_count, 7);
}

#[tokio::test]
async fn test_execute_rerun_is_idempotent() {
    let source = TestDb::new().await;
    let target = TestDb::new().await;
    source.exec(USERS).await;
    target.exec(USERS).await;
    source.fill("users", 30).await;

    let orchestrator = orchestrator(8);
    for _ in 0..2 {
        let results = orchestrator
            .execute_pair(
                &source.config(),
                &target.config(),
                vec!["users".to_string()],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(results[0].success);
        assert_eq!(results[0].synced_count, 30);
    }
    assert_eq!(target.count("users").await, 30);
}

#[tokio::test]
async fn test_execute_transfers_shared_columns_only() {
    let source = TestDb::new().await;
    let target = TestDb::new().await;
    source
        .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, legacy TEXT)")
        .await;
    target
        .exec("CREATE TABLE users (ID INTEGER PRIMARY KEY, NAME TEXT NOT NULL, created TEXT DEFAULT 'now')")
        .await;
    source.fill("users", 4).await;

    let results = orchestrator(500)
        .execute_pair(
            &source.config(),
            &target.config(),
            vec!["users".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(results[0].success, "{}", results[0].error_message);
    let name: String = sqlx::query_scalar("SELECT name FROM users WHERE id = 3")
        .fetch_one(&target.pool)
        .await
        .unwrap();
    assert_eq!(name, "users-3");
}

#[tokio::test]
async fn test_execute_reports_duplicates() {
    let source = TestDb::new().await;
    let target = TestDb::new().await;
    source.exec(USERS).await;
    target.exec(USERS).await;
    source.fill("users", 5).await;

    let results = orchestrator(500)
        .execute_pair(
            &source.config(),
            &target.config(),
            vec!["users".to_string(), "users".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert_eq!(results[0].synced_count, 5);
    assert!(!results[1].success);
    assert!(results[1].error_message.contains("more than once"));
}

#[tokio::test]
async fn test_cancelled_request_fails_without_results() {
    let source = TestDb::new().await;
    let target = TestDb::new().await;
    source.exec(USERS).await;
    target.exec(USERS).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator(500)
        .execute_pair(
            &source.config(),
            &target.config(),
            vec!["users".to_string()],
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CancellationError);
    assert_eq!(target.count("users").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_mid_transfer_counts_committed_rows() {
    let source = TestDb::new().await;
    let target = TestDb::new().await;
    source.exec(USERS).await;
    target.exec(USERS).await;
    source.fill("users", 20_000).await;

    // Cancel as soon as the first batch is visible on the target
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        let pool = target.pool.clone();
        tokio::spawn(async move {
            loop {
                let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                    .fetch_one(&pool)
                    .await
                    .unwrap();
                if rows > 0 {
                    cancel.cancel();
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    let results = orchestrator(50)
        .execute_pair(
            &source.config(),
            &target.config(),
            vec!["users".to_string()],
            &cancel,
        )
        .await
        .unwrap();
    watcher.await.unwrap();

    let committed = target.count("users").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].synced_count as i64, committed);
    if !results[0].success {
        assert_eq!(results[0].error_message, "Cancelled: transfer");
        assert!(committed > 0 && committed < 20_000);
    }
}

#[tokio::test]
async fn test_missing_local_file_fails_request() {
    let target = TestDb::new().await;
    let missing = ConnectionConfig::sqlite("/nonexistent/dir/local.db");

    let err = orchestrator(500)
        .compare_pair(&missing, &target.config(), None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionError);
}

#[tokio::test]
async fn test_connection_errors_never_echo_password() {
    let target = TestDb::new().await;
    let remote = ConnectionConfig::new("postgres", "127.0.0.1", 1, "sync", "app")
        .with_password("Pa55-w0rd!");

    let err = orchestrator(500)
        .execute_pair(
            &target.config(),
            &remote,
            vec!["users".to_string()],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(!err.to_string().contains("Pa55-w0rd!"));
    assert!(!format!("{:?}", err).contains("Pa55-w0rd!"));
    assert!(!format!("{:?}", remote).contains("Pa55-w0rd!"));
}

#[tokio::test]
async fn test_unsupported_engine() {
    let target = TestDb::new().await;
    let remote = ConnectionConfig::new("sqlserver", "localhost", 1433, "sa", "app");

    let err = orchestrator(500)
        .compare_pair(&target.config(), &remote, None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedEngine);
}
