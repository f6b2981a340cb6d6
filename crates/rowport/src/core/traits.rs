//! Store abstractions used by the migration engine.
//!
//! - [`SourceReader`]: reads every row of a source table
//! - [`TargetStore`]: existence/equality checks and mutations on the target
//!
//! The engine never talks to a database except through these traits, so the
//! decision logic can be exercised against [`MemoryStore`](crate::drivers::MemoryStore).

use async_trait::async_trait;

use super::statement::Statement;
use super::value::{FormattedRow, SourceRow};
use crate::error::Result;

/// Read rows from the source schema.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Fetch all rows of a table, in source query order, with every value
    /// stringified.
    async fn get_all(&self, table: &str) -> Result<Vec<SourceRow>>;

    /// Get the database type identifier (e.g., "mysql").
    fn db_type(&self) -> &str;
}

/// Check and mutate rows in the target schema.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Check whether a row with `pk_field = pk_value` exists.
    ///
    /// `pk_value` is an already formatted SQL literal.
    async fn record_exists(&self, table: &str, pk_field: &str, pk_value: &str) -> Result<bool>;

    /// Check whether a row exists whose columns equal every formatted value
    /// in `row` (one equality predicate per field, ANDed).
    async fn matches(&self, table: &str, row: &FormattedRow) -> Result<bool>;

    /// Execute a mutation, returning the last inserted id when the store
    /// assigned one.
    async fn execute(&self, statement: &Statement) -> Result<Option<u64>>;

    /// Get the database type identifier (e.g., "mysql").
    fn db_type(&self) -> &str;
}
