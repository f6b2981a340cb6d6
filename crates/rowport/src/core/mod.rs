//! Core abstractions shared by the conversion and sync engines.
//!
//! - [`value`]: source rows and formatted target rows
//! - [`identifier`]: identifier quoting and literal escaping
//! - [`statement`]: insert/update statements and their SQL rendering
//! - [`traits`]: source reader and target store traits

pub mod identifier;
pub mod statement;
pub mod traits;
pub mod value;

pub use statement::Statement;
pub use traits::{SourceReader, TargetStore};
pub use value::{source_row, FormattedRow, SourceRow};
