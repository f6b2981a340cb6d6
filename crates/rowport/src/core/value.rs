//! Row representations flowing through the conversion pipeline.

use std::collections::HashMap;

/// A raw source row: column name to stringified value, `None` for SQL NULL.
pub type SourceRow = HashMap<String, Option<String>>;

/// Target field values already formatted as SQL literals.
///
/// Keeps insertion order so generated statements list fields in the order
/// the conversion steps produced them. Re-inserting an existing field
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedRow {
    fields: Vec<(String, String)>,
}

impl FormattedRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field to an already formatted literal.
    pub fn insert(&mut self, field: impl Into<String>, literal: impl Into<String>) {
        let field = field.into();
        let literal = literal.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = literal,
            None => self.fields.push((field, literal)),
        }
    }

    /// Get the formatted literal for a field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, literal)| literal.as_str())
    }

    /// Remove a field, returning its literal.
    pub fn remove(&mut self, field: &str) -> Option<String> {
        let idx = self.fields.iter().position(|(name, _)| name == field)?;
        Some(self.fields.remove(idx).1)
    }

    /// Check whether a field is present.
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Iterate over `(field, literal)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormattedRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = FormattedRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Build a [`SourceRow`] from `(column, value)` pairs.
pub fn source_row<I, K>(pairs: I) -> SourceRow
where
    I: IntoIterator<Item = (K, Option<&'static str>)>,
    K: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.map(str::to_string)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_row_keeps_insertion_order() {
        let mut row = FormattedRow::new();
        row.insert("id", "1");
        row.insert("name", "\"a\"");
        row.insert("price", "10");
        row.insert("name", "\"b\"");

        let fields: Vec<_> = row.iter().collect();
        assert_eq!(fields, vec![("id", "1"), ("name", "\"b\""), ("price", "10")]);
    }

    #[test]
    fn test_formatted_row_remove() {
        let mut row: FormattedRow = [("id", "1"), ("name", "\"a\"")].into_iter().collect();
        assert_eq!(row.remove("id").as_deref(), Some("1"));
        assert!(!row.contains("id"));
        assert_eq!(row.len(), 1);
        assert!(row.remove("id").is_none());
    }

    #[test]
    fn test_source_row_builder() {
        let row = source_row([("id", Some("1")), ("deleted_at", None)]);
        assert_eq!(row.get("id"), Some(&Some("1".to_string())));
        assert_eq!(row.get("deleted_at"), Some(&None));
    }
}
