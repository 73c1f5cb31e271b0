//! SQL text generation per engine.
//!
//! Connectors build every statement through a [`SqlDialect`] so identifier
//! quoting, placeholders and upsert syntax live in one place. Values are always
//! bound as parameters; only quoted identifiers and integer literals are
//! interpolated.

use crate::db::types::{TypeCategory, categorize_type};
use crate::models::{ColumnDescriptor, DatabaseType, TableDescriptor};

pub trait SqlDialect: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    fn quote_identifier(&self, name: &str) -> String;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Bind parameters one statement may carry.
    fn max_bind_params(&self) -> usize;

    /// Select-list expression used to read `column` from this engine.
    fn select_expression(&self, column: &ColumnDescriptor) -> String {
        self.quote_identifier(&column.name)
    }

    /// VALUES expression for `column` bound at parameter `index`.
    fn value_expression(&self, _column: &ColumnDescriptor, index: usize) -> String {
        self.placeholder(index)
    }

    /// Clause appended to a multi-row INSERT to make it an upsert.
    fn upsert_clause(&self, pk_columns: &[&str], update_columns: &[&str]) -> String;

    fn count_sql(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_identifier(table))
    }

    /// One page of `table` in a stable order.
    ///
    /// Rows are ordered by the primary key, or by every selected column when
    /// the table has none, so consecutive pages neither overlap nor skip rows
    /// while the source is unchanged.
    fn select_batch_sql(&self, table: &TableDescriptor, limit: usize, offset: u64) -> String {
        let columns = table
            .columns
            .iter()
            .map(|c| self.select_expression(c))
            .collect::<Vec<_>>()
            .join(", ");

        let pk = table.primary_key();
        let order_by = if pk.is_empty() {
            (1..=table.columns.len())
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            pk.iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            columns,
            self.quote_identifier(&table.table_name),
            order_by,
            limit,
            offset
        )
    }

    /// Rows one INSERT statement can hold without exceeding the bind limit.
    fn rows_per_statement(&self, column_count: usize) -> usize {
        (self.max_bind_params() / column_count.max(1)).max(1)
    }

    /// Multi-row INSERT of `row_count` rows, upserting when `table` has a primary key.
    fn insert_sql(&self, table: &TableDescriptor, row_count: usize) -> String {
        let columns = table
            .columns
            .iter()
            .map(|c| self.quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let width = table.columns.len();
        let values = (0..row_count)
            .map(|row| {
                let tuple = table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| self.value_expression(column, row * width + i + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", tuple)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_identifier(&table.table_name),
            columns,
            values
        );

        let pk = table.primary_key();
        if !pk.is_empty() {
            let updates: Vec<&str> = table
                .columns
                .iter()
                .filter(|c| !c.is_primary_key)
                .map(|c| c.name.as_str())
                .collect();
            sql.push(' ');
            sql.push_str(&self.upsert_clause(&pk, &updates));
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn max_bind_params(&self) -> usize {
        65_535
    }

    // Numbers, booleans and bytes decode natively; everything else is read
    // through its text form so no per-type decoder is needed.
    fn select_expression(&self, column: &ColumnDescriptor) -> String {
        let name = self.quote_identifier(&column.name);
        match categorize_type(&column.declared_type, DatabaseType::PostgreSQL) {
            TypeCategory::Integer => format!("{}::int8", name),
            TypeCategory::Float => format!("{}::float8", name),
            TypeCategory::Boolean | TypeCategory::Binary => name,
            _ => format!("{}::text", name),
        }
    }

    // The cast lets text-encoded values (dates, numerics, enums, uuids) land in
    // their declared column type.
    fn value_expression(&self, column: &ColumnDescriptor, index: usize) -> String {
        if column.declared_type.is_empty() {
            self.placeholder(index)
        } else {
            format!("{}::{}", self.placeholder(index), column.declared_type)
        }
    }

    fn upsert_clause(&self, pk_columns: &[&str], update_columns: &[&str]) -> String {
        let conflict = quote_list(self, pk_columns);
        if update_columns.is_empty() {
            return format!("ON CONFLICT ({}) DO NOTHING", conflict);
        }
        let set = update_columns
            .iter()
            .map(|c| {
                let quoted = self.quote_identifier(c);
                format!("{} = EXCLUDED.{}", quoted, quoted)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("ON CONFLICT ({}) DO UPDATE SET {}", conflict, set)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn max_bind_params(&self) -> usize {
        65_535
    }

    // Temporal and other driver-specific types are read as their text form.
    fn select_expression(&self, column: &ColumnDescriptor) -> String {
        let name = self.quote_identifier(&column.name);
        match categorize_type(&column.declared_type, DatabaseType::MySQL) {
            TypeCategory::Unknown | TypeCategory::Uuid => format!("CAST({} AS CHAR)", name),
            _ => name,
        }
    }

    fn upsert_clause(&self, pk_columns: &[&str], update_columns: &[&str]) -> String {
        let set = if update_columns.is_empty() {
            pk_columns
                .iter()
                .map(|c| {
                    let quoted = self.quote_identifier(c);
                    format!("{} = {}", quoted, quoted)
                })
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            update_columns
                .iter()
                .map(|c| {
                    let quoted = self.quote_identifier(c);
                    format!("{} = VALUES({})", quoted, quoted)
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("ON DUPLICATE KEY UPDATE {}", set)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    /// SQLITE_MAX_VARIABLE_NUMBER since 3.32
    fn max_bind_params(&self) -> usize {
        32_766
    }

    fn upsert_clause(&self, pk_columns: &[&str], update_columns: &[&str]) -> String {
        let conflict = quote_list(self, pk_columns);
        if update_columns.is_empty() {
            return format!("ON CONFLICT({}) DO NOTHING", conflict);
        }
        let set = update_columns
            .iter()
            .map(|c| {
                let quoted = self.quote_identifier(c);
                format!("{} = excluded.{}", quoted, quoted)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("ON CONFLICT({}) DO UPDATE SET {}", conflict, set)
    }
}

fn quote_list<D: SqlDialect + ?Sized>(dialect: &D, names: &[&str]) -> String {
    names
        .iter()
        .map(|n| dialect.quote_identifier(n))
        .collect::<Vec<_>>()
        .join(", ")
}
