//! Migration orchestrator - main workflow coordinator.
//!
//! Runs every table rule in order: fetch the source rows, convert each row,
//! let the sync engine decide and perform the mutation, then report the
//! table's counters. The append registry carries assigned keys from one
//! table pass to the next. Any error stops the run; mutations already
//! performed are kept.
//!
//! Dump mode writes the SQL script, table headers and summaries to the
//! statement sink (stdout by default). Apply mode writes nothing there:
//! headers, summaries and progress marks go to the console sink (stderr by
//! default), leaving stdout to the run report.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{Config, DatabaseConfig, RunMode};
use crate::convert::{default_datetime_offset, parse_offset, ConversionEngine};
use crate::core::traits::{SourceReader, TargetStore};
use crate::drivers::{MysqlStore, StoreAccess};
use crate::error::Result;
use crate::registry::AppendRegistry;
use crate::rules::{file, NamedRule, RuleSet};
use crate::sync::{RowOutcome, StatementSink, SyncEngine, TableStats, WriterSink};

/// Migration orchestrator.
pub struct Orchestrator {
    rules: RuleSet,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetStore>,
    registry: AppendRegistry,
    sink: Box<dyn StatementSink>,
    console: Box<dyn StatementSink>,
    mode: RunMode,
    strict_foreign_keys: bool,
    progress: bool,
    datetime_offset: FixedOffset,
    config_hash: Option<String>,
    pools: Vec<Arc<MysqlStore>>,
}

/// Counters of one table pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    /// Display name of the rule.
    pub name: String,
    pub old_table: String,
    pub new_table: String,
    pub stats: TableStats,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Whether statements were executed or dumped.
    pub mode: RunMode,

    /// SHA-256 of the configuration, when run from a config file.
    pub config_hash: Option<String>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Per-table counters, in processing order.
    pub tables: Vec<TableReport>,

    /// Sum of all table counters.
    pub totals: TableStats,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Borrowed state of one run, split from the orchestrator so the rule set
/// can be iterated while the registry and sink are mutated.
struct Pass<'a> {
    source: &'a dyn SourceReader,
    target: &'a dyn TargetStore,
    registry: &'a mut AppendRegistry,
    sink: &'a mut dyn StatementSink,
    console: &'a mut dyn StatementSink,
    mode: RunMode,
    strict_foreign_keys: bool,
    progress: bool,
    datetime_offset: FixedOffset,
}

impl Orchestrator {
    /// Build an orchestrator over arbitrary stores.
    ///
    /// Defaults to apply mode, lenient foreign keys, no progress marks,
    /// datetimes rendered at `+01:00`, statements on stdout and table
    /// reports on stderr.
    pub fn new(rules: RuleSet, source: Arc<dyn SourceReader>, target: Arc<dyn TargetStore>) -> Self {
        Self {
            rules,
            source,
            target,
            registry: AppendRegistry::new(),
            sink: Box::new(WriterSink::stdout()),
            console: Box::new(WriterSink::stderr()),
            mode: RunMode::Apply,
            strict_foreign_keys: false,
            progress: false,
            datetime_offset: default_datetime_offset(),
            config_hash: None,
            pools: Vec::new(),
        }
    }

    /// Load the rules named by `config` and connect to both MySQL stores.
    pub async fn connect(config: &Config) -> Result<Self> {
        let datetime_offset = parse_offset(&config.migration.datetime_offset)?;
        let rules = file::load_dir(&config.migration.rules_dir)?;
        info!(
            "Loaded {} rules from {}",
            rules.len(),
            config.migration.rules_dir.display()
        );

        let source = Arc::new(MysqlStore::connect(&config.source, StoreAccess::ReadOnly).await?);
        let target = Arc::new(MysqlStore::connect(&config.target, StoreAccess::ReadWrite).await?);

        let mut orchestrator = Self::new(rules, source.clone(), target.clone())
            .with_mode(config.migration.mode)
            .with_strict_foreign_keys(config.migration.strict_foreign_keys)
            .with_progress(config.migration.progress)
            .with_datetime_offset(datetime_offset);
        orchestrator.config_hash = Some(config.hash());
        orchestrator.pools = vec![source, target];
        Ok(orchestrator)
    }

    /// Execute statements or only render them.
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fail on foreign keys with no appended counterpart.
    pub fn with_strict_foreign_keys(mut self, strict: bool) -> Self {
        self.strict_foreign_keys = strict;
        self
    }

    /// Print one progress mark per row (apply mode only).
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Render `timestamp_to_datetime` values at this UTC offset.
    pub fn with_datetime_offset(mut self, offset: FixedOffset) -> Self {
        self.datetime_offset = offset;
        self
    }

    /// Replace the statement sink receiving dump output.
    pub fn with_sink(mut self, sink: Box<dyn StatementSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the console sink receiving table reports in apply mode.
    pub fn with_console(mut self, console: Box<dyn StatementSink>) -> Self {
        self.console = console;
        self
    }

    /// Rules in processing order.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Keys recorded for appended rows by the last run.
    pub fn registry(&self) -> &AppendRegistry {
        &self.registry
    }

    /// Run every rule in order.
    pub async fn run(&mut self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting migration run: {} ({} rules, mode: {})",
            run_id,
            self.rules.len(),
            self.mode
        );

        self.registry.reset();
        let mut pass = Pass {
            source: self.source.as_ref(),
            target: self.target.as_ref(),
            registry: &mut self.registry,
            sink: self.sink.as_mut(),
            console: self.console.as_mut(),
            mode: self.mode,
            strict_foreign_keys: self.strict_foreign_keys,
            progress: self.progress,
            datetime_offset: self.datetime_offset,
        };

        let mut tables = Vec::with_capacity(self.rules.len());
        let mut totals = TableStats::default();
        for named in self.rules.iter() {
            let stats = match pass.migrate_table(named).await {
                Ok(stats) => stats,
                Err(e) => {
                    error!("{}: failed - {}", named.name, e);
                    return Err(e);
                }
            };
            totals.merge(&stats);
            tables.push(TableReport {
                name: named.name.to_string(),
                old_table: named.rule.old_table.clone(),
                new_table: named.rule.new_table.clone(),
                stats,
            });
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = MigrationResult {
            run_id,
            status: "completed".to_string(),
            mode: self.mode,
            config_hash: self.config_hash.clone(),
            duration_seconds: duration,
            started_at,
            completed_at,
            tables,
            totals,
        };

        info!(
            "Migration {}: {} tables, {} in {:.1}s",
            result.status,
            result.tables.len(),
            result.totals.summary(),
            result.duration_seconds
        );

        Ok(result)
    }

    /// Probe both stores described by `config`.
    pub async fn health_check(config: &Config) -> Result<HealthCheckResult> {
        let (source_connected, source_latency_ms, source_error) =
            probe(&config.source, StoreAccess::ReadOnly).await;
        let (target_connected, target_latency_ms, target_error) =
            probe(&config.target, StoreAccess::ReadWrite).await;

        Ok(HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        })
    }

    /// Disconnect the MySQL pools opened by [`connect`](Self::connect).
    pub async fn close(&self) {
        for pool in &self.pools {
            pool.close().await;
        }
    }
}

impl Pass<'_> {
    /// Where table headers, summaries and progress marks go.
    fn report(&mut self) -> &mut dyn StatementSink {
        match self.mode {
            RunMode::Dump => &mut *self.sink,
            RunMode::Apply => &mut *self.console,
        }
    }

    fn record(&mut self, stats: &mut TableStats, outcome: RowOutcome) -> Result<()> {
        stats.record(outcome);
        if self.progress && self.mode == RunMode::Apply {
            if let Some(mark) = outcome.progress_mark() {
                self.console.progress(mark)?;
            }
        }
        Ok(())
    }

    async fn migrate_table(&mut self, named: NamedRule<'_>) -> Result<TableStats> {
        let rule = named.rule;
        let started = Instant::now();
        info!("{}: {} -> {}", named.name, rule.old_table, rule.new_table);
        self.report().comment(&format!("----- {} -----", named.name))?;

        if rule.is_append() {
            self.registry.activate(&rule.new_table);
        }

        let rows = self.source.get_all(&rule.old_table).await?;
        let sync = SyncEngine::new(rule, self.target, self.mode);
        let mut stats = TableStats::default();

        for old in rows {
            // Skipped rows are never converted.
            let old_pk = rule.old_key(&old);
            if rule.is_skipped(&old_pk) {
                debug!("{}: skipping {} = {:?}", rule.new_table, rule.old_primary_key, old_pk);
                self.record(&mut stats, RowOutcome::Skipped)?;
                continue;
            }

            let ctx = ConversionEngine::new(&rule.old_table, &*self.registry)
                .with_strict_foreign_keys(self.strict_foreign_keys)
                .with_datetime_offset(self.datetime_offset)
                .run(&rule.steps, old)?;
            let outcome = sync
                .sync_row(ctx, &mut *self.registry, &mut *self.sink)
                .await?;
            self.record(&mut stats, outcome)?;
        }

        self.report().comment(&stats.summary())?;
        info!(
            "{}: {} ({:.1}s)",
            named.name,
            stats.summary(),
            started.elapsed().as_secs_f64()
        );
        Ok(stats)
    }
}

async fn probe(config: &DatabaseConfig, access: StoreAccess) -> (bool, u64, Option<String>) {
    let store = match MysqlStore::connect(config, access).await {
        Ok(store) => store,
        Err(e) => return (false, 0, Some(e.to_string())),
    };
    let result = match store.health_check().await {
        Ok(latency) => (true, latency, None),
        Err(e) => (false, 0, Some(e.to_string())),
    };
    store.close().await;
    result
}
