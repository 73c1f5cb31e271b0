//! MySQL / MariaDB connector.

use crate::config::SyncSettings;
use crate::db::connector::{Connector, WriteDeadline, check_row_width};
use crate::db::dialect::{MySqlDialect, SqlDialect};
use crate::db::pool::{DbPool, connection_failed};
use crate::db::types::{self, categorize_columns, coerce_for_target};
use crate::error::{SyncError, SyncOutcome};
use crate::models::{
    ColumnDescriptor, ConnectionConfig, DatabaseType, Row, SqlValue, SslMode, TableDescriptor,
};
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{MySql, Row as _};
use std::time::Duration;
use tracing::debug;

const DIALECT: MySqlDialect = MySqlDialect;
const DEFAULT_PORT: u16 = 3306;
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

// information_schema columns are converted explicitly: some server versions
// report them with a binary collation, which would decode as bytes.
mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT CONVERT(TABLE_NAME USING utf8mb4) AS TABLE_NAME
        FROM information_schema.tables
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8mb4) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8mb4) AS IS_NULLABLE,
            CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION,
            CONVERT(COLUMN_KEY USING utf8mb4) AS COLUMN_KEY
        FROM information_schema.columns
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
        ORDER BY ORDINAL_POSITION
        "#;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

fn ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::Disable => MySqlSslMode::Disabled,
        SslMode::Allow | SslMode::Prefer => MySqlSslMode::Preferred,
        SslMode::Require => MySqlSslMode::Required,
        SslMode::VerifyCa => MySqlSslMode::VerifyCa,
        SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Int(v) => query.bind(v),
        SqlValue::UInt(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Decimal(v) | SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(Json(v)),
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn open(
        &self,
        config: &ConnectionConfig,
        settings: &SyncSettings,
    ) -> SyncOutcome<DbPool> {
        let mut options = MySqlConnectOptions::new()
            .host(config.host())
            .port(config.port_or(DEFAULT_PORT))
            .username(config.user())
            .database(config.db_name())
            .charset("utf8mb4");
        if let Some(password) = config.password() {
            options = options.password(password);
        }
        if let Some(mode) = config.ssl_mode()? {
            options = options.ssl_mode(ssl_mode(mode));
        }

        let pool = MySqlPoolOptions::new()
            .min_connections(0)
            .max_connections(settings.pool_size())
            .acquire_timeout(settings.connect_timeout)
            .idle_timeout(IDLE_TIMEOUT)
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(|e| connection_failed(DatabaseType::MySQL, &e))?;
        Ok(DbPool::MySql(pool))
    }

    async fn ping(&self, pool: &DbPool) -> SyncOutcome<()> {
        sqlx::query("SELECT 1")
            .execute(pool.as_mysql()?)
            .await
            .map_err(|e| connection_failed(DatabaseType::MySQL, &e))?;
        Ok(())
    }

    async fn server_version(&self, pool: &DbPool) -> SyncOutcome<String> {
        Ok(sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(pool.as_mysql()?)
            .await?)
    }

    async fn list_tables(&self, pool: &DbPool) -> SyncOutcome<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(queries::LIST_TABLES)
            .fetch_all(pool.as_mysql()?)
            .await?;
        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    async fn count_rows(&self, pool: &DbPool, table: &str) -> SyncOutcome<u64> {
        let count = sqlx::query_scalar::<_, i64>(&DIALECT.count_sql(table))
            .fetch_one(pool.as_mysql()?)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn describe_table(&self, pool: &DbPool, table: &str) -> SyncOutcome<TableDescriptor> {
        let rows = sqlx::query(queries::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(pool.as_mysql()?)
            .await?;

        if rows.is_empty() {
            return Err(SyncError::schema(
                format!("Table '{}' not found", table),
                table,
            ));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("COLUMN_NAME")?;
            let column_type: String = row.try_get("COLUMN_TYPE")?;
            let is_nullable: String = row.try_get("IS_NULLABLE")?;
            let ordinal: i64 = row.try_get("ORDINAL_POSITION")?;
            let column_key: Option<String> = row.try_get("COLUMN_KEY")?;

            columns.push(
                ColumnDescriptor::new(
                    name,
                    column_type,
                    is_nullable.eq_ignore_ascii_case("YES"),
                    u32::try_from(ordinal).unwrap_or_default(),
                )
                .with_primary_key(column_key.as_deref() == Some("PRI")),
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
        let rows = sqlx::query(&sql).fetch_all(pool.as_mysql()?).await?;

        let names = table.column_names();
        let categories = categorize_columns(table, DatabaseType::MySQL);
        rows.iter()
            .map(|row| types::mysql::decode_row(row, &names, &categories))
            .collect()
    }

    async fn write_batch(
        &self,
        pool: &DbPool,
        table: &TableDescriptor,
        rows: &[Row],
        statement_timeout: Duration,
    ) -> SyncOutcome<u64> {
        let pool = pool.as_mysql()?;
        if rows.is_empty() {
            return Ok(0);
        }
        check_row_width(table, rows)?;

        let categories = categorize_columns(table, DatabaseType::MySQL);
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
        assert!(matches!(ssl_mode(SslMode::Allow), MySqlSslMode::Preferred));
        assert!(matches!(
            ssl_mode(SslMode::VerifyFull),
            MySqlSslMode::VerifyIdentity
        ));
        assert!(matches!(ssl_mode(SslMode::Disable), MySqlSslMode::Disabled));
    }
}
