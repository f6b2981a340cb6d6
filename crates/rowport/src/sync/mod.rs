//! Row synchronization decisions.
//!
//! For each converted row the [`SyncEngine`] decides, in order: skip it,
//! append it, insert it, leave it unchanged, or update it. Mutations are
//! either executed against the [`TargetStore`] (apply mode) or rendered to a
//! [`StatementSink`] (dump mode); both modes take the same decisions and
//! keep the [`AppendRegistry`] in the same state.

mod sink;

pub use sink::{MemorySink, StatementSink, WriterSink};

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RunMode;
use crate::convert::RowContext;
use crate::core::identifier::quote_literal;
use crate::core::statement::Statement;
use crate::core::traits::TargetStore;
use crate::core::value::{FormattedRow, SourceRow};
use crate::error::{MigrateError, Result};
use crate::registry::AppendRegistry;
use crate::rules::{OnError, TableRule};

/// A mutation kind subject to rule config gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    Insert,
    Update,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Insert => write!(f, "insert"),
            Mutation::Update => write!(f, "update"),
        }
    }
}

/// What happened to one source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Primary key listed in the rule's skip set.
    Skipped,
    /// Target row already identical.
    NoChange,
    /// Existing target row rewritten.
    Updated,
    /// New target row written (plain or appended).
    Inserted,
    /// Mutation disabled by the rule config and not performed.
    Forbidden(Mutation),
}

impl RowOutcome {
    /// Character printed by the progress indicator.
    pub fn progress_mark(&self) -> Option<char> {
        match self {
            RowOutcome::Skipped => Some('_'),
            RowOutcome::NoChange => Some('.'),
            RowOutcome::Updated => Some('U'),
            RowOutcome::Inserted => Some('I'),
            RowOutcome::Forbidden(_) => None,
        }
    }
}

/// Per-table counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub inserted: u64,
    pub updated: u64,
    pub nochange: u64,
    pub skipped: u64,
    /// Mutations refused by the rule config.
    pub forbidden: u64,
}

impl TableStats {
    /// Count a row outcome.
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Skipped => self.skipped += 1,
            RowOutcome::NoChange => self.nochange += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Inserted => self.inserted += 1,
            RowOutcome::Forbidden(_) => self.forbidden += 1,
        }
    }

    /// Add another table's counters.
    pub fn merge(&mut self, other: &TableStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.nochange += other.nochange;
        self.skipped += other.skipped;
        self.forbidden += other.forbidden;
    }

    /// Rows seen, whatever their outcome.
    pub fn rows(&self) -> u64 {
        self.inserted + self.updated + self.nochange + self.skipped + self.forbidden
    }

    /// End-of-table summary, without the comment marker.
    pub fn summary(&self) -> String {
        format!(
            "Inserted: {}, Updated: {}, No change: {}, Skipped: {}",
            self.inserted, self.updated, self.nochange, self.skipped
        )
    }
}

/// Session variable holding the id of a row appended in dump output.
pub fn session_variable(table: &str, old_pk: &str) -> String {
    let name = format!("{}_{}", table, old_pk);
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'));
    if plain {
        format!("@{}", name)
    } else {
        format!("@`{}`", name.replace('`', "``"))
    }
}

/// Decides and performs the mutation for each converted row of one rule.
pub struct SyncEngine<'a> {
    rule: &'a TableRule,
    target: &'a dyn TargetStore,
    mode: RunMode,
}

impl<'a> SyncEngine<'a> {
    /// Create an engine for `rule` against `target`.
    pub fn new(rule: &'a TableRule, target: &'a dyn TargetStore, mode: RunMode) -> Self {
        Self { rule, target, mode }
    }

    /// Synchronize one converted row.
    pub async fn sync_row(
        &self,
        ctx: RowContext,
        registry: &mut AppendRegistry,
        sink: &mut dyn StatementSink,
    ) -> Result<RowOutcome> {
        let rule = self.rule;
        let RowContext { old, mut new, .. } = ctx;
        let old_pk = rule.old_key(&old);

        if rule.is_skipped(&old_pk) {
            debug!("{}: skipping {} = {:?}", rule.new_table, rule.old_primary_key, old_pk);
            return Ok(RowOutcome::Skipped);
        }

        let appending = registry.is_active(&rule.new_table)
            && rule.append.as_ref().is_some_and(|p| p.holds(&old, &new));
        if appending {
            new.remove(&rule.new_primary_key);
            return self.append(new, &old_pk, registry, sink).await;
        }

        let key = self.target_key(&old, &new);
        if !self
            .target
            .record_exists(&rule.new_table, &rule.new_primary_key, &key)
            .await?
        {
            return self.insert(new, sink).await;
        }

        if self.target.matches(&rule.new_table, &new).await? {
            debug!("{}: {} = {} unchanged", rule.new_table, rule.new_primary_key, key);
            return Ok(RowOutcome::NoChange);
        }

        self.update(new, key, sink).await
    }

    /// Literal locating the target row: the converted primary key when the
    /// rule writes one, otherwise the quoted source key.
    fn target_key(&self, old: &SourceRow, new: &FormattedRow) -> String {
        if let Some(literal) = new.get(&self.rule.new_primary_key) {
            return literal.to_string();
        }
        match old.get(&self.rule.old_primary_key).and_then(|v| v.as_deref()) {
            Some(value) => quote_literal(value),
            None => "NULL".to_string(),
        }
    }

    async fn insert(&self, row: FormattedRow, sink: &mut dyn StatementSink) -> Result<RowOutcome> {
        if !self.rule.config.insert {
            return self.forbid(Mutation::Insert);
        }
        let statement = Statement::Insert {
            table: self.rule.new_table.clone(),
            row,
        };
        self.submit(&statement, sink).await?;
        Ok(RowOutcome::Inserted)
    }

    async fn update(
        &self,
        row: FormattedRow,
        key: String,
        sink: &mut dyn StatementSink,
    ) -> Result<RowOutcome> {
        if !self.rule.config.update {
            return self.forbid(Mutation::Update);
        }
        let statement = Statement::Update {
            table: self.rule.new_table.clone(),
            row,
            pk_field: self.rule.new_primary_key.clone(),
            pk_value: key,
        };
        self.submit(&statement, sink).await?;
        Ok(RowOutcome::Updated)
    }

    async fn append(
        &self,
        row: FormattedRow,
        old_pk: &str,
        registry: &mut AppendRegistry,
        sink: &mut dyn StatementSink,
    ) -> Result<RowOutcome> {
        if !self.rule.config.insert {
            return self.forbid(Mutation::Insert);
        }
        let table = &self.rule.new_table;
        let statement = Statement::Insert {
            table: table.clone(),
            row,
        };

        let marker = match self.mode {
            RunMode::Apply => {
                let id = self.target.execute(&statement).await?.ok_or_else(|| {
                    MigrateError::store(
                        "target assigned no key to the appended row",
                        format!("appending {} = {:?} to {}", self.rule.old_primary_key, old_pk, table),
                    )
                })?;
                id.to_string()
            }
            RunMode::Dump => {
                sink.statement(&statement.to_sql()?)?;
                let variable = session_variable(table, old_pk);
                let capture = Statement::CaptureInsertId {
                    variable: variable.clone(),
                };
                sink.statement(&capture.to_sql()?)?;
                variable
            }
        };

        debug!("{}: appended old key {:?} as {}", table, old_pk, marker);
        registry.register(table, old_pk, marker);
        Ok(RowOutcome::Inserted)
    }

    async fn submit(&self, statement: &Statement, sink: &mut dyn StatementSink) -> Result<()> {
        match self.mode {
            RunMode::Apply => {
                self.target.execute(statement).await?;
            }
            RunMode::Dump => sink.statement(&statement.to_sql()?)?,
        }
        Ok(())
    }

    fn forbid(&self, mutation: Mutation) -> Result<RowOutcome> {
        let table = &self.rule.new_table;
        match self.rule.config.on_error {
            OnError::Abort => return Err(MigrateError::forbidden(table.as_str(), mutation)),
            OnError::Warn => warn!("{}: {} explicitly forbidden", table, mutation),
            OnError::Silent => debug!("{}: {} explicitly forbidden", table, mutation),
        }
        Ok(RowOutcome::Forbidden(mutation))
    }
}
