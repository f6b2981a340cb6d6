//! rowport CLI - rule-driven row migration between MySQL schemas.

use clap::{Parser, Subcommand};
use rowport::rules::file;
use rowport::{Config, MigrateError, MigrationResult, Orchestrator, RuleSet, RunMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "rowport")]
#[command(about = "Rule-driven row migration between MySQL schemas")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print one progress character per row (apply mode only)
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every table rule against the target
    Run {
        /// Print the SQL statements instead of executing them
        #[arg(long)]
        dump: bool,

        /// Override the rule-file directory
        #[arg(long)]
        rules_dir: Option<PathBuf>,

        /// Fail on foreign keys with no appended counterpart
        #[arg(long)]
        strict_foreign_keys: bool,
    },

    /// Load the table rules and list them in processing order
    Rules {
        /// Rule-file directory (defaults to migration.rules_dir of the config)
        #[arg(long)]
        rules_dir: Option<PathBuf>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    // Listing rules from an explicit directory needs no configuration.
    if let Commands::Rules {
        rules_dir: Some(ref dir),
    } = cli.command
    {
        let rules = file::load_dir(dir)?;
        return print_rules(&rules, cli.output_json);
    }

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            dump,
            rules_dir,
            strict_foreign_keys,
        } => {
            // Apply overrides
            if dump {
                config.migration.mode = RunMode::Dump;
            }
            if let Some(dir) = rules_dir {
                config.migration.rules_dir = dir;
            }
            if strict_foreign_keys {
                config.migration.strict_foreign_keys = true;
            }
            if cli.progress {
                config.migration.progress = true;
            }
            config.validate()?;

            let mut orchestrator = Orchestrator::connect(&config).await?;
            let outcome = orchestrator.run().await;
            orchestrator.close().await;
            let result = outcome?;

            print_result(&result, cli.output_json)?;
        }

        Commands::Rules { rules_dir } => {
            let dir = rules_dir.unwrap_or_else(|| config.migration.rules_dir.clone());
            let rules = file::load_dir(&dir)?;
            print_rules(&rules, cli.output_json)?;
        }

        Commands::HealthCheck => {
            let result = Orchestrator::health_check(&config).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    config.source.database,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    config.target.database,
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::store("Health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

/// Print the run report. In dump mode stdout carries the SQL script, so the
/// report goes to stderr.
fn print_result(result: &MigrationResult, json: bool) -> Result<(), MigrateError> {
    let report = if json {
        result.to_json()?
    } else {
        let mut lines = vec![
            String::new(),
            match result.mode {
                RunMode::Apply => "Migration completed!".to_string(),
                RunMode::Dump => "Dump completed!".to_string(),
            },
            format!("  Run ID: {}", result.run_id),
            format!("  Duration: {:.2}s", result.duration_seconds),
            format!("  Tables: {}", result.tables.len()),
            format!("  {}", result.totals.summary()),
        ];
        if result.totals.forbidden > 0 {
            lines.push(format!("  Forbidden: {}", result.totals.forbidden));
        }
        lines.join("\n")
    };

    match result.mode {
        RunMode::Apply => println!("{}", report),
        RunMode::Dump => eprintln!("{}", report),
    }
    Ok(())
}

fn print_rules(rules: &RuleSet, json: bool) -> Result<(), MigrateError> {
    if json {
        let list: Vec<_> = rules
            .iter()
            .map(|named| {
                serde_json::json!({
                    "name": named.name,
                    "file": named.key,
                    "old_table": named.rule.old_table,
                    "new_table": named.rule.new_table,
                    "append": named.rule.is_append(),
                    "steps": named.rule.steps.len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!("Rules ({}):", rules.len());
    for (index, named) in rules.iter().enumerate() {
        let rule = named.rule;
        println!(
            "  {}. {}: {} -> {} ({} steps{}{})",
            index + 1,
            named.name,
            rule.old_table,
            rule.new_table,
            rule.steps.len(),
            if rule.is_append() { ", append" } else { "" },
            if rule.skip.is_empty() {
                String::new()
            } else {
                format!(", {} skipped", rule.skip.len())
            }
        );
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout is reserved for reports and dumped SQL.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
