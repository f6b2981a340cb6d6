//! Field conversion engine.
//!
//! A table rule is an ordered list of [`ConversionStep`]s. Each step reads the
//! row's raw source values and writes formatted SQL literals into the target
//! row; later steps see what earlier ones wrote. Values leaving this module
//! are final: the sync engine compares and writes them verbatim.

mod format;

pub use format::{
    coerce_integer, datetime_to_epoch, default_datetime_offset, epoch_to_datetime, parse_offset,
    DEFAULT_DATETIME_OFFSET,
};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::FixedOffset;
use tracing::debug;

use crate::core::identifier::{escape_string, quote_literal};
use crate::core::value::{FormattedRow, SourceRow};
use crate::error::{MigrateError, Result};
use crate::registry::AppendRegistry;

/// Conversion applied to a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Quoted, escaped text.
    String,
    /// Quoted, escaped text (date column).
    Date,
    /// Quoted, escaped text (datetime column).
    DateTime,
    /// Unquoted decimal integer (`int` or `integer`).
    Int,
    /// Unquoted decimal integer (timestamp column).
    Timestamp,
    /// Datetime string to unquoted epoch seconds.
    DatetimeToTimestamp,
    /// Epoch seconds to quoted `YYYY-MM-DD HH:MM:SS`.
    TimestampToDatetime,
}

impl FromStr for FieldType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(FieldType::String),
            "date" => Ok(FieldType::Date),
            "datetime" => Ok(FieldType::DateTime),
            "int" | "integer" => Ok(FieldType::Int),
            "timestamp" => Ok(FieldType::Timestamp),
            "datetime_to_timestamp" => Ok(FieldType::DatetimeToTimestamp),
            "timestamp_to_datetime" => Ok(FieldType::TimestampToDatetime),
            other => Err(MigrateError::Config(format!(
                "Unknown conversion type: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Int => "int",
            FieldType::Timestamp => "timestamp",
            FieldType::DatetimeToTimestamp => "datetime_to_timestamp",
            FieldType::TimestampToDatetime => "timestamp_to_datetime",
        };
        f.write_str(name)
    }
}

/// Per-row working state: raw source values and formatted target values.
#[derive(Debug, Clone)]
pub struct RowContext {
    /// Source values, `None` for SQL NULL.
    pub old: SourceRow,
    /// Target values, already formatted as SQL literals.
    pub new: FormattedRow,
    /// Offset `timestamp_to_datetime` renders in.
    pub datetime_offset: FixedOffset,
}

impl Default for RowContext {
    fn default() -> Self {
        Self::new(SourceRow::new())
    }
}

impl RowContext {
    /// Start processing a source row.
    pub fn new(old: SourceRow) -> Self {
        Self {
            old,
            new: FormattedRow::new(),
            datetime_offset: default_datetime_offset(),
        }
    }

    /// Raw source value of a field; `None` when absent or NULL.
    pub fn old_value(&self, field: &str) -> Option<&str> {
        self.old.get(field).and_then(|v| v.as_deref())
    }
}

/// Signature of a custom conversion procedure.
pub type CustomProcedure = dyn Fn(&mut RowContext) -> Result<()> + Send + Sync;

/// A named, user-supplied conversion step.
#[derive(Clone)]
pub struct CustomStep {
    name: String,
    procedure: Arc<CustomProcedure>,
}

impl CustomStep {
    /// Wrap a procedure. It must leave `ctx.new` formatted.
    pub fn new<F>(name: impl Into<String>, procedure: F) -> Self
    where
        F: Fn(&mut RowContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            procedure: Arc::new(procedure),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &mut RowContext) -> Result<()> {
        (self.procedure)(ctx)
    }
}

impl fmt::Debug for CustomStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomStep").field("name", &self.name).finish()
    }
}

/// One unit of a table rule body.
#[derive(Debug, Clone)]
pub enum ConversionStep {
    /// Format `old_field` as `kind` and store it under `new_field`.
    Convert {
        kind: FieldType,
        old_field: String,
        new_field: String,
    },

    /// Replace the old foreign-key value in `field` with the key appended
    /// for it in `table`, when one was recorded.
    ResolveForeignKey { field: String, table: String },

    /// Arbitrary per-row logic.
    Custom(CustomStep),
}

impl ConversionStep {
    /// Convert a field keeping its name.
    pub fn convert(kind: FieldType, field: impl Into<String>) -> Self {
        let field = field.into();
        ConversionStep::Convert {
            kind,
            old_field: field.clone(),
            new_field: field,
        }
    }

    /// Convert a field into a differently named target field.
    pub fn convert_as(kind: FieldType, old_field: impl Into<String>, new_field: impl Into<String>) -> Self {
        ConversionStep::Convert {
            kind,
            old_field: old_field.into(),
            new_field: new_field.into(),
        }
    }

    /// Resolve an appended foreign key.
    pub fn foreign_key(field: impl Into<String>, table: impl Into<String>) -> Self {
        ConversionStep::ResolveForeignKey {
            field: field.into(),
            table: table.into(),
        }
    }

    /// Add a custom procedure.
    pub fn custom<F>(name: impl Into<String>, procedure: F) -> Self
    where
        F: Fn(&mut RowContext) -> Result<()> + Send + Sync + 'static,
    {
        ConversionStep::Custom(CustomStep::new(name, procedure))
    }
}

/// Format a raw source value as a SQL literal of the given type.
///
/// `offset` only affects `timestamp_to_datetime`; `table` and `field` only
/// label data errors.
pub fn format_value(
    kind: FieldType,
    offset: FixedOffset,
    table: &str,
    field: &str,
    value: Option<&str>,
) -> Result<String> {
    match kind {
        FieldType::String | FieldType::Date | FieldType::DateTime => {
            Ok(quote_literal(value.unwrap_or("")))
        }
        FieldType::Int | FieldType::Timestamp => Ok(match value {
            // Empty sentinel kept for NULL sources.
            None => quote_literal(""),
            // Session variable carrying an id inserted earlier in a dump.
            Some(v) if v.starts_with('@') => v.to_string(),
            Some(v) => escape_string(&coerce_integer(v)),
        }),
        FieldType::DatetimeToTimestamp => match value {
            None => Ok("0".to_string()),
            Some(v) => datetime_to_epoch(v)
                .map(|secs| secs.to_string())
                .ok_or_else(|| MigrateError::InvalidDatetime {
                    table: table.to_string(),
                    field: field.to_string(),
                    value: v.to_string(),
                }),
        },
        FieldType::TimestampToDatetime => {
            let raw = value.unwrap_or("0");
            coerce_integer(raw)
                .parse::<i64>()
                .ok()
                .and_then(|secs| epoch_to_datetime(secs, offset))
                .map(|dt| format!("\"{}\"", dt))
                .ok_or_else(|| MigrateError::InvalidTimestamp {
                    table: table.to_string(),
                    field: field.to_string(),
                    value: raw.to_string(),
                })
        }
    }
}

/// Applies conversion steps to the rows of one table.
pub struct ConversionEngine<'a> {
    table: &'a str,
    registry: &'a AppendRegistry,
    strict_foreign_keys: bool,
    datetime_offset: FixedOffset,
}

impl<'a> ConversionEngine<'a> {
    /// Create an engine for rows of `table`, resolving foreign keys through `registry`.
    pub fn new(table: &'a str, registry: &'a AppendRegistry) -> Self {
        Self {
            table,
            registry,
            strict_foreign_keys: false,
            datetime_offset: default_datetime_offset(),
        }
    }

    /// Fail on foreign-key lookups that find no appended key.
    pub fn with_strict_foreign_keys(mut self, strict: bool) -> Self {
        self.strict_foreign_keys = strict;
        self
    }

    /// Render `timestamp_to_datetime` values at this offset.
    pub fn with_datetime_offset(mut self, offset: FixedOffset) -> Self {
        self.datetime_offset = offset;
        self
    }

    /// Run every step, in order, on a source row.
    pub fn run(&self, steps: &[ConversionStep], old: SourceRow) -> Result<RowContext> {
        let mut ctx = RowContext::new(old);
        ctx.datetime_offset = self.datetime_offset;
        for step in steps {
            self.apply(step, &mut ctx)?;
        }
        Ok(ctx)
    }

    /// Apply a single step to the row context.
    pub fn apply(&self, step: &ConversionStep, ctx: &mut RowContext) -> Result<()> {
        match step {
            ConversionStep::Convert {
                kind,
                old_field,
                new_field,
            } => {
                let literal = format_value(
                    *kind,
                    self.datetime_offset,
                    self.table,
                    old_field,
                    ctx.old_value(old_field),
                )?;
                ctx.new.insert(new_field.as_str(), literal);
                Ok(())
            }
            ConversionStep::ResolveForeignKey { field, table } => {
                self.resolve_foreign_key(field, table, ctx)
            }
            ConversionStep::Custom(custom) => custom.call(ctx),
        }
    }

    fn resolve_foreign_key(&self, field: &str, table: &str, ctx: &mut RowContext) -> Result<()> {
        let old_value = ctx.old_value(field).unwrap_or("").to_string();
        match self.registry.resolve(table, &old_value) {
            Some(marker) => {
                ctx.old.insert(field.to_string(), Some(marker.to_string()));
                Ok(())
            }
            None if self.strict_foreign_keys && ctx.old_value(field).is_some() => {
                Err(MigrateError::UnresolvedForeignKey {
                    table: table.to_string(),
                    field: field.to_string(),
                    value: old_value,
                })
            }
            None => {
                debug!(
                    "{}: no appended key in {} for {} = {:?}, keeping old value",
                    self.table, table, field, old_value
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::source_row;

    fn sample_row() -> SourceRow {
        source_row([
            ("id", Some("1")),
            ("name", Some("old_name")),
            ("gender", Some("i")),
            ("date", Some("2009-02-12 15:35:13")),
            ("tstamp", Some("1234450083")),
            ("zip", Some("007")),
            ("note", None),
        ])
    }

    fn run(steps: &[ConversionStep]) -> Result<RowContext> {
        let registry = AppendRegistry::new();
        ConversionEngine::new("b", &registry).run(steps, sample_row())
    }

    #[test]
    fn test_field_type_parsing() {
        assert_eq!("integer".parse::<FieldType>().unwrap(), FieldType::Int);
        assert_eq!("int".parse::<FieldType>().unwrap(), FieldType::Int);
        assert_eq!(
            "timestamp_to_datetime".parse::<FieldType>().unwrap(),
            FieldType::TimestampToDatetime
        );
        let err = "float".parse::<FieldType>().unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert!(err.to_string().contains("Unknown conversion type"));
    }

    #[test]
    fn test_string_conversion_quotes_value() {
        let ctx = run(&[ConversionStep::convert(FieldType::String, "name")]).unwrap();
        assert_eq!(ctx.new.get("name"), Some("\"old_name\""));
    }

    #[test]
    fn test_string_conversion_escapes_and_handles_null() {
        let registry = AppendRegistry::new();
        let engine = ConversionEngine::new("b", &registry);
        let ctx = engine
            .run(
                &[
                    ConversionStep::convert(FieldType::String, "name"),
                    ConversionStep::convert(FieldType::DateTime, "note"),
                ],
                source_row([("name", Some("O'Brien \"Bob\"")), ("note", None)]),
            )
            .unwrap();
        assert_eq!(ctx.new.get("name"), Some("\"O\\'Brien \\\"Bob\\\"\""));
        assert_eq!(ctx.new.get("note"), Some("\"\""));
    }

    #[test]
    fn test_renamed_field_writes_only_new_name() {
        let ctx = run(&[ConversionStep::convert_as(FieldType::String, "gender", "sex")]).unwrap();
        assert_eq!(ctx.new.get("sex"), Some("\"i\""));
        assert!(!ctx.new.contains("gender"));
    }

    #[test]
    fn test_int_conversion() {
        let ctx = run(&[
            ConversionStep::convert(FieldType::Int, "zip"),
            ConversionStep::convert(FieldType::Int, "note"),
        ])
        .unwrap();
        assert_eq!(ctx.new.get("zip"), Some("7"));
        assert_eq!(ctx.new.get("note"), Some("\"\""));
    }

    #[test]
    fn test_int_conversion_passes_session_variable() {
        let registry = AppendRegistry::new();
        let ctx = ConversionEngine::new("posts", &registry)
            .run(
                &[ConversionStep::convert(FieldType::Int, "user_id")],
                source_row([("user_id", Some("@users_3"))]),
            )
            .unwrap();
        assert_eq!(ctx.new.get("user_id"), Some("@users_3"));
    }

    #[test]
    fn test_datetime_to_timestamp() {
        let ctx = run(&[ConversionStep::convert(FieldType::DatetimeToTimestamp, "date")]).unwrap();
        assert_eq!(ctx.new.get("date"), Some("1234452913"));
    }

    #[test]
    fn test_datetime_to_timestamp_zero_values() {
        let registry = AppendRegistry::new();
        let ctx = ConversionEngine::new("b", &registry)
            .run(
                &[
                    ConversionStep::convert(FieldType::DatetimeToTimestamp, "zero"),
                    ConversionStep::convert(FieldType::DatetimeToTimestamp, "missing"),
                ],
                source_row([("zero", Some("0000-00-00 00:00:00")), ("missing", None)]),
            )
            .unwrap();
        assert_eq!(ctx.new.get("zero"), Some("0"));
        assert_eq!(ctx.new.get("missing"), Some("0"));
    }

    #[test]
    fn test_datetime_to_timestamp_invalid_is_fatal() {
        let registry = AppendRegistry::new();
        let err = ConversionEngine::new("b", &registry)
            .run(
                &[ConversionStep::convert(FieldType::DatetimeToTimestamp, "date")],
                source_row([("date", Some("not a date"))]),
            )
            .unwrap_err();
        match err {
            MigrateError::InvalidDatetime { table, field, value } => {
                assert_eq!(table, "b");
                assert_eq!(field, "date");
                assert_eq!(value, "not a date");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_timestamp_to_datetime() {
        let ctx = run(&[ConversionStep::convert(FieldType::TimestampToDatetime, "tstamp")]).unwrap();
        assert_eq!(ctx.new.get("tstamp"), Some("\"2009-02-12 15:48:03\""));
    }

    #[test]
    fn test_timestamp_to_datetime_uses_engine_offset() {
        let registry = AppendRegistry::new();
        let ctx = ConversionEngine::new("b", &registry)
            .with_datetime_offset(parse_offset("+00:00").unwrap())
            .run(
                &[ConversionStep::convert(FieldType::TimestampToDatetime, "tstamp")],
                sample_row(),
            )
            .unwrap();
        assert_eq!(ctx.new.get("tstamp"), Some("\"2009-02-12 14:48:03\""));
        assert_eq!(ctx.datetime_offset, parse_offset("+00:00").unwrap());
    }

    #[test]
    fn test_timestamp_to_datetime_out_of_range() {
        let registry = AppendRegistry::new();
        let result = ConversionEngine::new("b", &registry).run(
            &[ConversionStep::convert(FieldType::TimestampToDatetime, "t")],
            source_row([("t", Some("99999999999999999999"))]),
        );
        assert!(matches!(result, Err(MigrateError::InvalidTimestamp { .. })));
    }

    #[test]
    fn test_custom_step_sees_earlier_output() {
        let ctx = run(&[
            ConversionStep::convert(FieldType::String, "name"),
            ConversionStep::custom("shout", |ctx| {
                let name = ctx.new.get("name").unwrap_or("\"\"").to_uppercase();
                ctx.new.insert("name", name);
                Ok(())
            }),
        ])
        .unwrap();
        assert_eq!(ctx.new.get("name"), Some("\"OLD_NAME\""));
    }

    #[test]
    fn test_custom_step_errors_propagate() {
        let result = run(&[ConversionStep::custom("fail", |_| {
            Err(MigrateError::Config("boom".into()))
        })]);
        assert!(result.is_err());
    }

    #[test]
    fn test_foreign_key_resolution_rewrites_before_formatting() {
        let mut registry = AppendRegistry::new();
        registry.register("new_c", "1", "10");
        let ctx = ConversionEngine::new("d", &registry)
            .run(
                &[
                    ConversionStep::foreign_key("c_id", "new_c"),
                    ConversionStep::convert(FieldType::Int, "c_id"),
                ],
                source_row([("c_id", Some("1"))]),
            )
            .unwrap();
        assert_eq!(ctx.new.get("c_id"), Some("10"));
    }

    #[test]
    fn test_foreign_key_miss_keeps_value() {
        let mut registry = AppendRegistry::new();
        registry.activate("new_c");
        let ctx = ConversionEngine::new("d", &registry)
            .run(
                &[
                    ConversionStep::foreign_key("c_id", "new_c"),
                    ConversionStep::convert(FieldType::Int, "c_id"),
                ],
                source_row([("c_id", Some("2"))]),
            )
            .unwrap();
        assert_eq!(ctx.new.get("c_id"), Some("2"));
    }

    #[test]
    fn test_foreign_key_miss_in_strict_mode() {
        let registry = AppendRegistry::new();
        let engine = ConversionEngine::new("d", &registry).with_strict_foreign_keys(true);

        let err = engine
            .run(
                &[ConversionStep::foreign_key("c_id", "new_c")],
                source_row([("c_id", Some("2"))]),
            )
            .unwrap_err();
        assert!(matches!(err, MigrateError::UnresolvedForeignKey { .. }));

        // NULL foreign keys have nothing to resolve.
        assert!(engine
            .run(
                &[ConversionStep::foreign_key("c_id", "new_c")],
                source_row([("c_id", None)]),
            )
            .is_ok());
    }
}
