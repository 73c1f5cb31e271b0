//! SQLite connector.
//!
//! `db_name` is the path of the database file. The file must already exist;
//! a sync never creates an empty database by accident.

use crate::config::SyncSettings;
use crate::db::connector::{Connector, WriteDeadline, check_row_width};
use crate::db::dialect::{SqlDialect, SqliteDialect};
use crate::db::pool::{DbPool, connection_failed};
use crate::db::types::{self, categorize_columns, coerce_for_target};
use crate::error::{SyncError, SyncOutcome};
use crate::models::{ColumnDescriptor, ConnectionConfig, DatabaseType, Row, SqlValue, TableDescriptor};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row as _, Sqlite};
use std::time::Duration;
use tracing::debug;

const DIALECT: SqliteDialect = SqliteDialect;
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table'
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const DESCRIBE_COLUMNS: &str =
        r#"SELECT cid, name, type, "notnull", pk FROM pragma_table_info(?1) ORDER BY cid"#;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

// SQLite has no native JSON or unsigned 64-bit type, store as text
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Int(v) => query.bind(v),
        SqlValue::UInt(v) => match i64::try_from(v) {
            Ok(v) => query.bind(v),
            Err(_) => query.bind(v.to_string()),
        },
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Decimal(v) | SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(v.to_string()),
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn open(
        &self,
        config: &ConnectionConfig,
        settings: &SyncSettings,
    ) -> SyncOutcome<DbPool> {
        // Concurrent table workers contend for the single writer lock
        let options = SqliteConnectOptions::new()
            .filename(config.db_name())
            .create_if_missing(false)
            .busy_timeout(settings.query_timeout);

        let pool = SqlitePoolOptions::new()
            .min_connections(0)
            .max_connections(settings.pool_size())
            .acquire_timeout(settings.connect_timeout)
            .idle_timeout(IDLE_TIMEOUT)
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(|e| connection_failed(DatabaseType::SQLite, &e))?;
        Ok(DbPool::SQLite(pool))
    }

    async fn ping(&self, pool: &DbPool) -> SyncOutcome<()> {
        sqlx::query("SELECT 1")
            .execute(pool.as_sqlite()?)
            .await
            .map_err(|e| connection_failed(DatabaseType::SQLite, &e))?;
        Ok(())
    }

    async fn server_version(&self, pool: &DbPool) -> SyncOutcome<String> {
        Ok(sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
            .fetch_one(pool.as_sqlite()?)
            .await?)
    }

    async fn list_tables(&self, pool: &DbPool) -> SyncOutcome<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(queries::LIST_TABLES)
            .fetch_all(pool.as_sqlite()?)
            .await?;
        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    async fn count_rows(&self, pool: &DbPool, table: &str) -> SyncOutcome<u64> {
        let count = sqlx::query_scalar::<_, i64>(&DIALECT.count_sql(table))
            .fetch_one(pool.as_sqlite()?)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn describe_table(&self, pool: &DbPool, table: &str) -> SyncOutcome<TableDescriptor> {
        let rows = sqlx::query(queries::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(pool.as_sqlite()?)
            .await?;

        if rows.is_empty() {
            return Err(SyncError::schema(
                format!("Table '{}' not found", table),
                table,
            ));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let cid: i64 = row.try_get("cid")?;
            let name: String = row.try_get("name")?;
            let data_type: String = row.try_get("type")?;
            let notnull: i64 = row.try_get("notnull")?;
            let pk: i64 = row.try_get("pk")?;

            columns.push(
                ColumnDescriptor::new(
                    name,
                    data_type,
                    notnull == 0,
                    u32::try_from(cid + 1).unwrap_or_default(),
                )
                .with_primary_key(pk > 0),
            );
        }

        Ok(TableDescriptor::new(table, columns))
    }

    async fn read_batch(
        &self,
        pool: &DbPool,
        table: &TableDescriptor,
        offset: u64,
        limit: usize,
    ) -> SyncOutcome<Vec<Row>> {
        let sql = DIALECT.select_batch_sql(table, limit, offset);
        let rows = sqlx::query(&sql).fetch_all(pool.as_sqlite()?).await?;

        let names = table.column_names();
        rows.iter()
            .map(|row| types::sqlite::decode_row(row, &names))
            .collect()
    }

    async fn write_batch(
        &self,
        pool: &DbPool,
        table: &TableDescriptor,
        rows: &[Row],
        statement_timeout: Duration,
    ) -> SyncOutcome<u64> {
        let pool = pool.as_sqlite()?;
        if rows.is_empty() {
            return Ok(0);
        }
        check_row_width(table, rows)?;

        let categories = categorize_columns(table, DatabaseType::SQLite);
        let per_statement = DIALECT.rows_per_statement(table.columns.len());

        let deadline = WriteDeadline::starting_now(statement_timeout);
        let mut tx = deadline.bound(pool.begin()).await?;
        for chunk in rows.chunks(per_statement) {
            let sql = DIALECT.insert_sql(table, chunk.len());
            let mut query = sqlx::query(&sql);
            for row in chunk {
                for (value, category) in row.iter().zip(&categories) {
                    query = bind_value(query, coerce_for_target(value.clone(), *category));
                }
            }
            deadline.bound(query.execute(&mut *tx)).await?;
        }
        tx.commit().await.map_err(SyncError::from_write)?;

        Ok(rows.len() as u64)
    }
}
