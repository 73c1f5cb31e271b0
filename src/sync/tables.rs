//! Table name resolution across the two sides.
//!
//! Engines disagree on identifier case (SQLite matches names ignoring case,
//! PostgreSQL quoted identifiers do not), so a table is matched across sides
//! ignoring case and then addressed on each side by that side's own spelling.

use crate::sync::workers::TableJob;
use std::collections::HashMap;

/// One table as requested, with the name each side knows it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Name reported in results
    pub name: String,
    pub local: String,
    pub remote: String,
}

impl TableRef {
    /// Same spelling on both sides.
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            local: name.clone(),
            remote: name.clone(),
            name,
        }
    }
}

impl TableJob for TableRef {
    fn table_name(&self) -> &str {
        &self.name
    }
}

/// Case-insensitive lookup over one side's table list.
struct Catalog<'a> {
    by_lower: HashMap<String, &'a str>,
    names: &'a [String],
}

impl<'a> Catalog<'a> {
    fn new(names: &'a [String]) -> Self {
        let mut by_lower = HashMap::new();
        for name in names {
            by_lower.entry(name.to_lowercase()).or_insert(name.as_str());
        }
        Self { by_lower, names }
    }

    /// The exact spelling when present, otherwise the first name equal
    /// ignoring case.
    fn find(&self, name: &str) -> Option<&'a str> {
        if let Some(exact) = self.names.iter().find(|n| *n == name) {
            return Some(exact.as_str());
        }
        self.by_lower.get(&name.to_lowercase()).copied()
    }
}

/// Tables present on both sides, in local order.
pub fn shared_tables(local: &[String], remote: &[String]) -> Vec<TableRef> {
    let remote = Catalog::new(remote);
    local
        .iter()
        .filter_map(|name| {
            remote.find(name).map(|remote_name| TableRef {
                name: name.clone(),
                local: name.clone(),
                remote: remote_name.to_string(),
            })
        })
        .collect()
}

/// Resolve requested names against both sides' tables.
///
/// A name missing on a side is kept as requested; the failure surfaces when
/// that side is queried.
pub fn resolve_tables(requested: Vec<String>, local: &[String], remote: &[String]) -> Vec<TableRef> {
    let local = Catalog::new(local);
    let remote = Catalog::new(remote);
    requested
        .into_iter()
        .map(|name| TableRef {
            local: local.find(&name).unwrap_or(name.as_str()).to_string(),
            remote: remote.find(&name).unwrap_or(name.as_str()).to_string(),
            name,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_shared_tables_use_each_sides_spelling() {
        let local = names(&["Users", "audit", "orders"]);
        let remote = names(&["orders", "users"]);

        let shared = shared_tables(&local, &remote);
        assert_eq!(
            shared,
            vec![
                TableRef {
                    name: "Users".into(),
                    local: "Users".into(),
                    remote: "users".into(),
                },
                TableRef::same("orders"),
            ]
        );
    }

    #[test]
    fn test_exact_spelling_wins() {
        let remote = names(&["users", "Users"]);
        let shared = shared_tables(&names(&["Users"]), &remote);
        assert_eq!(shared[0].remote, "Users");
    }

    #[test]
    fn test_resolve_requested_names() {
        let local = names(&["Orders"]);
        let remote = names(&["orders"]);

        let resolved = resolve_tables(names(&["orders", "missing"]), &local, &remote);
        assert_eq!(resolved[0].name, "orders");
        assert_eq!(resolved[0].local, "Orders");
        assert_eq!(resolved[0].remote, "orders");
        assert_eq!(resolved[1], TableRef::same("missing"));
    }
}
