//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration and rule errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for source/target store failures.
pub const EXIT_STORE_ERROR: u8 = 2;
/// Exit code for unconvertible source data.
pub const EXIT_DATA_ERROR: u8 = 3;
/// Exit code for a forbidden mutation under `on_error: abort`.
pub const EXIT_POLICY_ERROR: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, unknown conversion type, empty rule, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target store error with context
    #[error("Store error: {message}\n  Context: {context}")]
    Store { message: String, context: String },

    /// MySQL driver error
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// A datetime value could not be parsed into a timestamp
    #[error("Invalid datetime in {table}.{field}: {value:?}")]
    InvalidDatetime {
        table: String,
        field: String,
        value: String,
    },

    /// A timestamp value is outside the representable range
    #[error("Invalid timestamp in {table}.{field}: {value:?}")]
    InvalidTimestamp {
        table: String,
        field: String,
        value: String,
    },

    /// Insert or update attempted while disabled with `on_error: abort`
    #[error("{table}: {kind} explicitly forbidden")]
    Forbidden { table: String, kind: String },

    /// Append lookup miss while strict foreign keys are enabled
    #[error("Unresolved foreign key {field} = {value:?} referencing {table}")]
    UnresolvedForeignKey {
        table: String,
        field: String,
        value: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Store error with context about where it occurred
    pub fn store(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Store {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Forbidden error for a disabled mutation kind
    pub fn forbidden(table: impl Into<String>, kind: impl ToString) -> Self {
        MigrateError::Forbidden {
            table: table.into(),
            kind: kind.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Store { .. } | MigrateError::Mysql(_) => EXIT_STORE_ERROR,
            MigrateError::InvalidDatetime { .. }
            | MigrateError::InvalidTimestamp { .. }
            | MigrateError::UnresolvedForeignKey { .. } => EXIT_DATA_ERROR,
            MigrateError::Forbidden { .. } => EXIT_POLICY_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Json(_) => EXIT_CONFIG_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
