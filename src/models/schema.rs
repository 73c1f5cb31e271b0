//! Schema-related data models.
//!
//! Descriptors are recomputed for every operation; schemas may drift between
//! requests so nothing here is cached.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Type as declared in the catalog, e.g. `character varying(255)`
    pub declared_type: String,
    pub nullable: bool,
    /// 1-based ordinal position
    pub ordinal: u32,
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    /// Create a new column descriptor.
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        nullable: bool,
        ordinal: u32,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable,
            ordinal,
            is_primary_key: false,
        }
    }

    /// Mark this column as part of the primary key.
    pub fn with_primary_key(mut self, is_primary_key: bool) -> Self {
        self.is_primary_key = is_primary_key;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub table_name: String,
    /// Ordered by ordinal position
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(table_name: impl Into<String>, mut columns: Vec<ColumnDescriptor>) -> Self {
        columns.sort_by_key(|c| c.ordinal);
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }

    /// Find a column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Keep only the named columns, in the order given.
    ///
    /// Names are matched case-insensitively; unknown names are skipped.
    pub fn project(&self, names: &[&str]) -> TableDescriptor {
        let columns = names
            .iter()
            .filter_map(|name| self.column(name).cloned())
            .collect();
        TableDescriptor {
            table_name: self.table_name.clone(),
            columns,
        }
    }

    /// Drop primary-key flags, e.g. after a projection lost part of the key.
    pub fn without_primary_key(mut self) -> Self {
        for column in &mut self.columns {
            column.is_primary_key = false;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDescriptor {
        TableDescriptor::new(
            "users",
            vec![
                ColumnDescriptor::new("name", "text", true, 2),
                ColumnDescriptor::new("id", "integer", false, 1).with_primary_key(true),
                ColumnDescriptor::new("email", "varchar(255)", true, 3),
            ],
        )
    }

    #[test]
    fn test_columns_sorted_by_ordinal() {
        assert_eq!(users().column_names(), vec!["id", "name", "email"]);
    }

    #[test]
    fn test_primary_key() {
        let table = users();
        assert!(table.has_primary_key());
        assert_eq!(table.primary_key(), vec!["id"]);
    }

    #[test]
    fn test_column_lookup_ignores_case() {
        assert!(users().column("EMAIL").is_some());
        assert!(users().column("missing").is_none());
    }

    #[test]
    fn test_project_keeps_requested_order() {
        let projected = users().project(&["Email", "id", "nope"]);
        assert_eq!(projected.column_names(), vec!["email", "id"]);
        assert_eq!(projected.primary_key(), vec!["id"]);
    }

    #[test]
    fn test_without_primary_key() {
        let table = users().without_primary_key();
        assert!(!table.has_primary_key());
        assert_eq!(table.columns.len(), 3);
    }
}
