//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::convert::DEFAULT_DATETIME_OFFSET;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (read-only).
    pub source: DatabaseConfig,

    /// Target database configuration (read/write).
    pub target: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Connection settings for one side of the migration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type (only "mysql" for now).
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full (default: disable).
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Directory holding the table rule files (default: "tables").
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,

    /// Whether statements are executed or only rendered (default: apply).
    #[serde(default)]
    pub mode: RunMode,

    /// Fail the run when a foreign-key lookup finds no appended key.
    #[serde(default)]
    pub strict_foreign_keys: bool,

    /// Print one progress character per row (apply mode only).
    #[serde(default)]
    pub progress: bool,

    /// UTC offset `timestamp_to_datetime` renders in (default: "+01:00").
    #[serde(default = "default_datetime_offset")]
    pub datetime_offset: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            rules_dir: default_rules_dir(),
            mode: RunMode::default(),
            strict_foreign_keys: false,
            progress: false,
            datetime_offset: default_datetime_offset(),
        }
    }
}

/// How mutations are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Execute statements against the target.
    #[default]
    Apply,

    /// Render statements for offline inspection without executing them.
    Dump,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Apply => write!(f, "apply"),
            RunMode::Dump => write!(f, "dump"),
        }
    }
}

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_datetime_offset() -> String {
    DEFAULT_DATETIME_OFFSET.to_string()
}

fn default_rules_dir() -> PathBuf {
    PathBuf::from("tables")
}
