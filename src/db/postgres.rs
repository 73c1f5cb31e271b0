//! PostgreSQL connector.

use crate::config::SyncSettings;
use crate::db::connector::{Connector, WriteDeadline, check_row_width};
use crate::db::dialect::{PostgresDialect, SqlDialect};
use crate::db::pool::{DbPool, connection_failed};
use crate::db::types::{self, TypeCategory, categorize_columns, coerce_for_target};
use crate::error::{SyncError, SyncOutcome};
use crate::models::{
    ColumnDescriptor, ConnectionConfig, DatabaseType, Row, SqlValue, SslMode, TableDescriptor,
};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::query::Query;
use sqlx::{Postgres, Row as _};
use std::time::Duration;
use tracing::debug;

const DIALECT: PostgresDialect = PostgresDialect;
const DEFAULT_PORT: u16 = 5432;
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT table_name::text AS table_name
        FROM information_schema.tables
        WHERE table_schema = current_schema()
        AND table_type = 'BASE TABLE'
        ORDER BY table_name
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            c.is_nullable::text AS is_nullable,
            c.ordinal_position::int4 AS ordinal_position,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                    AND tc.table_name = kcu.table_name
                WHERE tc.table_schema = c.table_schema
                AND tc.table_name = c.table_name
                AND tc.constraint_type = 'PRIMARY KEY'
                AND kcu.column_name = c.column_name
            ) AS is_primary_key
        FROM information_schema.columns c
        JOIN pg_namespace n ON n.nspname = c.table_schema
        JOIN pg_class t ON t.relname = c.table_name AND t.relnamespace = n.oid
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        WHERE c.table_name = $1 AND c.table_schema = current_schema()
        ORDER BY c.ordinal_position
        "#;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

/// Bind a value to a PostgreSQL query.
///
/// Every placeholder carries a cast to the target column type, so text-form
/// values are converted server-side.
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: SqlValue,
) -> Query<'q, Postgres, PgArguments> {
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
impl Connector for PostgresConnector {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn open(
        &self,
        config: &ConnectionConfig,
        settings: &SyncSettings,
    ) -> SyncOutcome<DbPool> {
        let mut options = PgConnectOptions::new()
            .host(config.host())
            .port(config.port_or(DEFAULT_PORT))
            .username(config.user())
            .database(config.db_name())
            .application_name(env!("CARGO_PKG_NAME"));
        if let Some(password) = config.password() {
            options = options.password(password);
        }
        if let Some(mode) = config.ssl_mode()? {
            options = options.ssl_mode(ssl_mode(mode));
        }

        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(settings.pool_size())
            .acquire_timeout(settings.connect_timeout)
            .idle_timeout(IDLE_TIMEOUT)
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(|e| connection_failed(DatabaseType::PostgreSQL, &e))?;
        Ok(DbPool::Postgres(pool))
    }

    async fn ping(&self, pool: &DbPool) -> SyncOutcome<()> {
        sqlx::query("SELECT 1")
            .execute(pool.as_postgres()?)
            .await
            .map_err(|e| connection_failed(DatabaseType::PostgreSQL, &e))?;
        Ok(())
    }

    async fn server_version(&self, pool: &DbPool) -> SyncOutcome<String> {
        Ok(sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(pool.as_postgres()?)
            .await?)
    }

    async fn list_tables(&self, pool: &DbPool) -> SyncOutcome<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(queries::LIST_TABLES)
            .fetch_all(pool.as_postgres()?)
            .await?;
        debug!(count = tables.len(), "Listed PostgreSQL tables");
        Ok(tables)
    }

    async fn count_rows(&self, pool: &DbPool, table: &str) -> SyncOutcome<u64> {
        let count = sqlx::query_scalar::<_, i64>(&DIALECT.count_sql(table))
            .fetch_one(pool.as_postgres()?)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn describe_table(&self, pool: &DbPool, table: &str) -> SyncOutcome<TableDescriptor> {
        let rows = sqlx::query(queries::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(pool.as_postgres()?)
            .await?;

        if rows.is_empty() {
            return Err(SyncError::schema(
                format!("Table '{}' not found", table),
                table,
            ));
        }

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get("column_name")?;
                let column_type: String = row.try_get("column_type")?;
                let is_nullable: String = row.try_get("is_nullable")?;
                let ordinal: i32 = row.try_get("ordinal_position")?;
                let is_pk: bool = row.try_get("is_primary_key")?;
                Ok(ColumnDescriptor::new(
                    name,
                    column_type,
                    is_nullable.eq_ignore_ascii_case("YES"),
                    ordinal.max(0) as u32,
                )
                .with_primary_key(is_pk))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

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
        let rows = sqlx::query(&sql).fetch_all(pool.as_postgres()?).await?;

        let names = table.column_names();
        let categories = categorize_columns(table, DatabaseType::PostgreSQL);
        rows.iter()
            .map(|row| types::postgres::decode_row(row, &names, &categories))
            .collect()
    }

    async fn write_batch(
        &self,
        pool: &DbPool,
        table: &TableDescriptor,
        rows: &[Row],
        statement_timeout: Duration,
    ) -> SyncOutcome<u64> {
        let pool = pool.as_postgres()?;
        if rows.is_empty() {
            return Ok(0);
        }
        check_row_width(table, rows)?;

        let categories: Vec<TypeCategory> = categorize_columns(table, DatabaseType::PostgreSQL);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode(SslMode::Disable), PgSslMode::Disable));
        assert!(matches!(ssl_mode(SslMode::VerifyFull), PgSslMode::VerifyFull));
    }

    #[tokio::test]
    async fn test_rejects_foreign_pool() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let err = PostgresConnector
            .list_tables(&DbPool::SQLite(pool))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}
