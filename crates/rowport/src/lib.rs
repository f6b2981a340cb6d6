//! # rowport
//!
//! Rule-driven row migration between two MySQL schemas.
//!
//! Each source table is described by a [`TableRule`]: an ordered list of
//! conversion steps plus the policy for writing the converted rows. For
//! every source row the library:
//!
//! - **Converts** fields into SQL literals (type coercion, renames, date and
//!   timestamp conversions, custom procedures)
//! - **Decides** whether to skip, insert, update or leave the target row alone
//! - **Appends** rows under new auto-increment keys and rewrites the foreign
//!   keys of later tables to follow them
//! - **Applies** the statements or **dumps** them as a replayable SQL script
//!
//! ## Example
//!
//! ```rust,no_run
//! use rowport::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> rowport::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut orchestrator = Orchestrator::connect(&config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("{}", result.totals.summary());
//!     orchestrator.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod rules;
pub mod sync;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, MigrationConfig, RunMode};
pub use convert::{ConversionEngine, ConversionStep, FieldType, RowContext};
pub use crate::core::{FormattedRow, SourceReader, SourceRow, Statement, TargetStore};
pub use drivers::{MemoryStore, MysqlStore, StoreAccess};
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthCheckResult, MigrationResult, Orchestrator, TableReport};
pub use registry::AppendRegistry;
pub use rules::{AppendPredicate, OnError, RuleConfig, RuleSet, TableRule};
pub use sync::{MemorySink, RowOutcome, StatementSink, SyncEngine, TableStats, WriterSink};
