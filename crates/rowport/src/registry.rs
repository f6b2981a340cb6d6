//! Registry of primary keys assigned to appended rows.
//!
//! When a table rule runs in append mode its rows are inserted without their
//! original primary key, and the key the target assigns is recorded here
//! under the old value. Rules processed later rewrite their foreign keys
//! through [`AppendRegistry::resolve`]. The registry is the only state shared
//! between table passes, so a referenced table must be processed before the
//! tables that reference it.

use std::collections::HashMap;

/// Mapping `target_table -> (old_pk_value -> new_pk_marker)`.
///
/// A marker is either the decimal id assigned by the target store or, in dump
/// mode, the name of the session variable holding it (`@users_12`).
#[derive(Debug, Clone, Default)]
pub struct AppendRegistry {
    tables: HashMap<String, HashMap<String, String>>,
}

impl AppendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a table as append-enabled. Existing mappings are kept.
    pub fn activate(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    /// Check whether a table is append-enabled.
    pub fn is_active(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Record the new key assigned to an appended row.
    ///
    /// Activates the table if needed.
    pub fn register(&mut self, table: &str, old_pk: impl Into<String>, marker: impl Into<String>) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(old_pk.into(), marker.into());
    }

    /// Look up the new key for an old primary-key value.
    pub fn resolve(&self, table: &str, old_pk: &str) -> Option<&str> {
        self.tables
            .get(table)
            .and_then(|keys| keys.get(old_pk))
            .map(String::as_str)
    }

    /// Number of mappings recorded for a table.
    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, HashMap::len)
    }

    /// Forget every table and mapping.
    pub fn reset(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = AppendRegistry::new();
        registry.activate("users");
        registry.register("users", "1", "10");

        assert!(registry.is_active("users"));
        assert_eq!(registry.resolve("users", "1"), Some("10"));
        assert_eq!(registry.resolve("users", "2"), None);
        assert_eq!(registry.len("users"), 1);
    }

    #[test]
    fn test_unknown_table_resolves_to_none() {
        let registry = AppendRegistry::new();
        assert!(!registry.is_active("posts"));
        assert_eq!(registry.resolve("posts", "1"), None);
        assert_eq!(registry.len("posts"), 0);
    }

    #[test]
    fn test_activate_keeps_existing_mappings() {
        let mut registry = AppendRegistry::new();
        registry.register("users", "1", "@users_1");
        registry.activate("users");
        assert_eq!(registry.resolve("users", "1"), Some("@users_1"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut registry = AppendRegistry::new();
        registry.register("users", "1", "10");
        registry.reset();
        assert!(!registry.is_active("users"));
        assert_eq!(registry.resolve("users", "1"), None);
    }
}
