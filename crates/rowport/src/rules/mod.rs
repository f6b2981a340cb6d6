//! Table rule definitions.
//!
//! A [`TableRule`] describes how one source table maps onto one target table:
//! which tables and primary keys are involved, which source rows to skip,
//! which mutations are allowed, whether rows are appended, and the ordered
//! conversion steps. Rules are plain values owned by the orchestrator and
//! borrowed by the engines for each row.

pub mod file;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::convert::ConversionStep;
use crate::core::identifier::validate_identifier;
use crate::core::value::{FormattedRow, SourceRow};
use crate::error::{MigrateError, Result};

/// What to do when a rule attempts a mutation its config disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Log a warning and continue with the next row.
    #[default]
    Warn,
    /// Continue without a diagnostic.
    Silent,
    /// Stop the whole run.
    Abort,
}

/// Mutations a rule is allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Allow inserts (default: true).
    #[serde(default = "default_true")]
    pub insert: bool,

    /// Allow updates (default: true).
    #[serde(default = "default_true")]
    pub update: bool,

    /// Policy for disallowed mutations (default: warn).
    #[serde(default)]
    pub on_error: OnError,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            insert: true,
            update: true,
            on_error: OnError::Warn,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Signature of an append condition over the (old, new) row pair.
pub type AppendCondition = dyn Fn(&SourceRow, &FormattedRow) -> bool + Send + Sync;

/// Decides which rows of an append-enabled rule are appended.
#[derive(Clone)]
pub struct AppendPredicate {
    label: String,
    condition: Arc<AppendCondition>,
}

impl AppendPredicate {
    /// Append every row.
    pub fn always() -> Self {
        Self::new("always", |_, _| true)
    }

    /// Append the rows for which `condition` holds.
    pub fn new<F>(label: impl Into<String>, condition: F) -> Self
    where
        F: Fn(&SourceRow, &FormattedRow) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            condition: Arc::new(condition),
        }
    }

    /// Evaluate the predicate for a row.
    pub fn holds(&self, old: &SourceRow, new: &FormattedRow) -> bool {
        (self.condition)(old, new)
    }

    /// Short description used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for AppendPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AppendPredicate").field(&self.label).finish()
    }
}

/// Conversion contract for one source table.
#[derive(Debug, Clone)]
pub struct TableRule {
    /// Source table.
    pub old_table: String,
    /// Target table.
    pub new_table: String,
    /// Primary key field of the source table (default: "id").
    pub old_primary_key: String,
    /// Primary key field of the target table (default: "id").
    pub new_primary_key: String,
    /// Source primary-key values excluded from processing.
    pub skip: HashSet<String>,
    /// Allowed mutations.
    pub config: RuleConfig,
    /// Present when the rule runs in append mode.
    pub append: Option<AppendPredicate>,
    /// Ordered conversion steps.
    pub steps: Vec<ConversionStep>,
}

impl TableRule {
    /// Create a rule with default keys, no skips, default config and no steps.
    pub fn new(old_table: impl Into<String>, new_table: impl Into<String>) -> Self {
        Self {
            old_table: old_table.into(),
            new_table: new_table.into(),
            old_primary_key: "id".to_string(),
            new_primary_key: "id".to_string(),
            skip: HashSet::new(),
            config: RuleConfig::default(),
            append: None,
            steps: Vec::new(),
        }
    }

    /// Set the source and target primary key fields.
    pub fn with_primary_keys(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.old_primary_key = old.into();
        self.new_primary_key = new.into();
        self
    }

    /// Add source primary-key values to skip.
    pub fn with_skip<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(values.into_iter().map(Into::into));
        self
    }

    /// Set the mutation config.
    pub fn with_config(mut self, config: RuleConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable append mode.
    pub fn with_append(mut self, predicate: AppendPredicate) -> Self {
        self.append = Some(predicate);
        self
    }

    /// Add a conversion step.
    pub fn step(mut self, step: ConversionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Check that the rule can be run.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.old_table)?;
        validate_identifier(&self.new_table)?;
        validate_identifier(&self.old_primary_key)?;
        validate_identifier(&self.new_primary_key)?;
        if self.steps.is_empty() {
            return Err(MigrateError::Config(format!(
                "rule {} -> {} has no conversion steps",
                self.old_table, self.new_table
            )));
        }
        Ok(())
    }

    /// Whether the rule declared append mode.
    pub fn is_append(&self) -> bool {
        self.append.is_some()
    }

    /// Whether a source primary-key value is in the skip set.
    pub fn is_skipped(&self, old_pk: &str) -> bool {
        self.skip.contains(old_pk)
    }

    /// Raw source primary-key value of a row; empty for NULL or missing.
    pub fn old_key(&self, old: &SourceRow) -> String {
        old.get(&self.old_primary_key)
            .and_then(|v| v.clone())
            .unwrap_or_default()
    }
}

/// Table rules ordered by key.
///
/// Keys sort lexicographically; a key may start with numeric `NN_` prefixes
/// to force an order (`10_users`, `20_posts`). The prefixes are dropped from
/// the display name.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: BTreeMap<String, TableRule>,
}

/// A rule together with its ordering key and display name.
#[derive(Debug, Clone, Copy)]
pub struct NamedRule<'a> {
    pub key: &'a str,
    pub name: &'a str,
    pub rule: &'a TableRule,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a rule under an ordering key.
    pub fn insert(&mut self, key: impl Into<String>, rule: TableRule) -> Result<()> {
        let key = key.into();
        rule.validate().map_err(|e| match e {
            MigrateError::Config(msg) => MigrateError::Config(format!("rule {}: {}", key, msg)),
            other => other,
        })?;
        if self.rules.contains_key(&key) {
            return Err(MigrateError::Config(format!("duplicate rule key: {}", key)));
        }
        self.rules.insert(key, rule);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_rule(mut self, key: impl Into<String>, rule: TableRule) -> Result<Self> {
        self.insert(key, rule)?;
        Ok(self)
    }

    /// Iterate over rules in processing order.
    pub fn iter(&self) -> impl Iterator<Item = NamedRule<'_>> {
        self.rules.iter().map(|(key, rule)| NamedRule {
            key,
            name: display_name(key),
            rule,
        })
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Strip leading `NN_` ordering prefixes from a rule key.
pub fn display_name(key: &str) -> &str {
    let mut name = key;
    loop {
        let digits = name.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 && name.as_bytes().get(digits) == Some(&b'_') && name.len() > digits + 1 {
            name = &name[digits + 1..];
        } else {
            return name;
        }
    }
}
