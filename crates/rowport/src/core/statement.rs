//! Mutation statements issued by the sync engine.

use super::identifier::quote_ident;
use super::value::FormattedRow;
use crate::error::{MigrateError, Result};

/// A mutation against the target store.
///
/// Values inside `row` are already formatted literals; rendering only quotes
/// identifiers and joins the pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `insert into <table>( <f1>,... ) values( <v1>,... )`
    Insert { table: String, row: FormattedRow },

    /// `update <table> set <f1> = <v1>, ... where <pk_field> = <pk_value>`
    Update {
        table: String,
        row: FormattedRow,
        pk_field: String,
        pk_value: String,
    },

    /// `set @<variable> = last_insert_id()`, emitted after dumped append inserts.
    CaptureInsertId { variable: String },
}

impl Statement {
    /// Render the statement as SQL text.
    pub fn to_sql(&self) -> Result<String> {
        match self {
            Statement::Insert { table, row } => {
                let mut fields = Vec::with_capacity(row.len());
                let mut values = Vec::with_capacity(row.len());
                for (field, literal) in row.iter() {
                    fields.push(quote_ident(field)?);
                    values.push(literal);
                }
                Ok(format!(
                    "insert into {}( {} ) values( {} )",
                    quote_ident(table)?,
                    fields.join(","),
                    values.join(",")
                ))
            }
            Statement::Update {
                table,
                row,
                pk_field,
                pk_value,
            } => {
                let mut setters = Vec::with_capacity(row.len());
                for (field, literal) in row.iter() {
                    if field == pk_field {
                        continue;
                    }
                    setters.push(format!("{} = {}", quote_ident(field)?, literal));
                }
                if setters.is_empty() {
                    return Err(MigrateError::Config(format!(
                        "update on {} has no fields besides {}",
                        table, pk_field
                    )));
                }
                Ok(format!(
                    "update {} set {} where {} = {}",
                    quote_ident(table)?,
                    setters.join(", "),
                    quote_ident(pk_field)?,
                    pk_value
                ))
            }
            Statement::CaptureInsertId { variable } => {
                Ok(format!("set {} = last_insert_id()", variable))
            }
        }
    }

    /// Target table of the statement, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Statement::Insert { table, .. } | Statement::Update { table, .. } => Some(table),
            Statement::CaptureInsertId { .. } => None,
        }
    }
}
