//! In-memory source and target store.
//!
//! Holds source rows as raw values and target rows as formatted literals.
//! Comparisons are textual on the unquoted literal, which is close enough to
//! MySQL's `1 = "1"` coercion for rehearsing a rule set without a server.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::statement::Statement;
use crate::core::traits::{SourceReader, TargetStore};
use crate::core::value::{FormattedRow, SourceRow};
use crate::error::{MigrateError, Result};

#[derive(Debug, Clone)]
struct MemoryTable {
    pk_field: String,
    next_id: u64,
    rows: Vec<FormattedRow>,
}

impl MemoryTable {
    fn new(pk_field: &str) -> Self {
        Self {
            pk_field: pk_field.to_string(),
            next_id: 1,
            rows: Vec::new(),
        }
    }

    /// Store a row, assigning the next id when it carries no primary key.
    fn insert(&mut self, mut row: FormattedRow) -> Option<u64> {
        let assigned = match row.get(&self.pk_field).map(unquote) {
            Some(pk) => {
                if let Ok(id) = pk.parse::<u64>() {
                    self.next_id = self.next_id.max(id.saturating_add(1));
                }
                None
            }
            None => {
                let id = self.next_id;
                self.next_id = self.next_id.saturating_add(1);
                row.insert(self.pk_field.as_str(), id.to_string());
                Some(id)
            }
        };
        self.rows.push(row);
        assigned
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    source: HashMap<String, Vec<SourceRow>>,
    target: HashMap<String, MemoryTable>,
    queries: usize,
    executed: Vec<String>,
}

/// Source and target store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add source rows to a table.
    pub fn with_source_rows(self, table: &str, rows: Vec<SourceRow>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.source.entry(table.to_string()).or_default().extend(rows);
        }
        self
    }

    /// Declare a target table with a non-default primary key field.
    pub fn with_target_table(self, table: &str, pk_field: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .target
                .insert(table.to_string(), MemoryTable::new(pk_field));
        }
        self
    }

    /// Set the next id assigned to rows inserted without a primary key.
    pub fn with_auto_increment(self, table: &str, next_id: u64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .target
                .entry(table.to_string())
                .or_insert_with(|| MemoryTable::new("id"))
                .next_id = next_id;
        }
        self
    }

    /// Seed a target row.
    pub fn with_target_row(self, table: &str, row: FormattedRow) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .target
                .entry(table.to_string())
                .or_insert_with(|| MemoryTable::new("id"))
                .insert(row);
        }
        self
    }

    /// Current rows of a target table.
    pub fn target_rows(&self, table: &str) -> Vec<FormattedRow> {
        self.lock()
            .ok()
            .and_then(|state| state.target.get(table).map(|t| t.rows.clone()))
            .unwrap_or_default()
    }

    /// Number of existence and equality checks served.
    pub fn query_count(&self) -> usize {
        self.lock().map(|state| state.queries).unwrap_or_default()
    }

    /// Rendered SQL of every executed statement, in order.
    pub fn executed(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.executed.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| MigrateError::store(e, "locking in-memory store"))
    }
}

/// Strip the double quotes of a string literal.
fn unquote(literal: &str) -> &str {
    literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal)
}

fn same_value(stored: Option<&str>, literal: &str) -> bool {
    stored.is_some_and(|s| unquote(s) == unquote(literal))
}

#[async_trait]
impl SourceReader for MemoryStore {
    async fn get_all(&self, table: &str) -> Result<Vec<SourceRow>> {
        self.lock()?
            .source
            .get(table)
            .cloned()
            .ok_or_else(|| MigrateError::store(format!("table {} not found", table), "reading source rows"))
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn record_exists(&self, table: &str, pk_field: &str, pk_value: &str) -> Result<bool> {
        let mut state = self.lock()?;
        state.queries += 1;
        Ok(state.target.get(table).is_some_and(|t| {
            t.rows
                .iter()
                .any(|row| same_value(row.get(pk_field), pk_value))
        }))
    }

    async fn matches(&self, table: &str, row: &FormattedRow) -> Result<bool> {
        let mut state = self.lock()?;
        state.queries += 1;
        Ok(state.target.get(table).is_some_and(|t| {
            t.rows.iter().any(|stored| {
                row.iter()
                    .all(|(field, literal)| same_value(stored.get(field), literal))
            })
        }))
    }

    async fn execute(&self, statement: &Statement) -> Result<Option<u64>> {
        let sql = statement.to_sql()?;
        let mut state = self.lock()?;

        let assigned = match statement {
            Statement::Insert { table, row } => state
                .target
                .entry(table.clone())
                .or_insert_with(|| MemoryTable::new("id"))
                .insert(row.clone()),
            Statement::Update {
                table,
                row,
                pk_field,
                pk_value,
            } => {
                if let Some(target) = state.target.get_mut(table) {
                    for stored in target
                        .rows
                        .iter_mut()
                        .filter(|stored| same_value(stored.get(pk_field), pk_value))
                    {
                        for (field, literal) in row.iter().filter(|(f, _)| *f != pk_field.as_str()) {
                            stored.insert(field, literal);
                        }
                    }
                }
                None
            }
            Statement::CaptureInsertId { .. } => None,
        };

        state.executed.push(sql);
        Ok(assigned)
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::source_row;

    #[tokio::test]
    async fn test_source_rows() {
        let store = MemoryStore::new().with_source_rows("users", vec![source_row([("id", Some("1"))])]);
        assert_eq!(store.get_all("users").await.unwrap().len(), 1);
        assert!(matches!(
            store.get_all("missing").await,
            Err(MigrateError::Store { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_increment_and_explicit_keys() {
        let store = MemoryStore::new().with_target_row(
            "users",
            [("id", "5"), ("name", "\"a\"")].into_iter().collect(),
        );

        let insert = Statement::Insert {
            table: "users".into(),
            row: [("name", "\"b\"")].into_iter().collect(),
        };
        assert_eq!(store.execute(&insert).await.unwrap(), Some(6));

        let explicit = Statement::Insert {
            table: "users".into(),
            row: [("id", "9"), ("name", "\"c\"")].into_iter().collect(),
        };
        assert_eq!(store.execute(&explicit).await.unwrap(), None);
        assert_eq!(store.execute(&insert).await.unwrap(), Some(10));
        assert_eq!(store.target_rows("users").len(), 4);
    }

    #[tokio::test]
    async fn test_largest_explicit_key_does_not_overflow() {
        let store = MemoryStore::new().with_target_row(
            "users",
            [("id", "18446744073709551615"), ("name", "\"max\"")].into_iter().collect(),
        );
        let explicit = Statement::Insert {
            table: "users".into(),
            row: [("id", "\"18446744073709551615\""), ("name", "\"again\"")].into_iter().collect(),
        };
        assert_eq!(store.execute(&explicit).await.unwrap(), None);

        let insert = Statement::Insert {
            table: "users".into(),
            row: [("name", "\"next\"")].into_iter().collect(),
        };
        assert_eq!(store.execute(&insert).await.unwrap(), Some(u64::MAX));
        assert_eq!(store.target_rows("users").len(), 3);
    }

    #[tokio::test]
    async fn test_textual_comparison_ignores_quotes() {
        let store = MemoryStore::new().with_target_row(
            "users",
            [("id", "1"), ("name", "\"a\"")].into_iter().collect(),
        );

        assert!(store.record_exists("users", "id", "\"1\"").await.unwrap());
        assert!(!store.record_exists("users", "id", "2").await.unwrap());
        assert!(store
            .matches("users", &[("id", "\"1\""), ("name", "\"a\"")].into_iter().collect())
            .await
            .unwrap());
        assert!(!store
            .matches("users", &[("name", "\"b\"")].into_iter().collect())
            .await
            .unwrap());
        assert!(!store
            .matches("posts", &[("id", "1")].into_iter().collect())
            .await
            .unwrap());
        assert_eq!(store.query_count(), 5);
    }

    #[tokio::test]
    async fn test_update_rewrites_non_key_fields() {
        let store = MemoryStore::new().with_target_row(
            "users",
            [("id", "1"), ("name", "\"a\"")].into_iter().collect(),
        );
        let update = Statement::Update {
            table: "users".into(),
            row: [("id", "1"), ("name", "\"z\"")].into_iter().collect(),
            pk_field: "id".into(),
            pk_value: "1".into(),
        };
        store.execute(&update).await.unwrap();

        let rows = store.target_rows("users");
        assert_eq!(rows[0].get("name"), Some("\"z\""));
        assert_eq!(
            store.executed(),
            vec!["update `users` set `name` = \"z\" where `id` = 1".to_string()]
        );
    }
}
