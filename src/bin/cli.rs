use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tabled::{Table, Tabled, settings::Style};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hashsync::{Config, Environment, OverrideList, RunStatus, RunSummary, SyncRunner};

#[derive(Parser)]
#[command(name = "hashsync")]
#[command(about = "Publish only the tables whose content fingerprint changed")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, env = "HASHSYNC_CONFIG", default_value = "./hashsync.yaml")]
    config: PathBuf,

    /// Environment (dev, staging, prod). Overrides the config file
    #[arg(short, long, env = "HASHSYNC_ENV", value_parser = parse_environment)]
    env: Option<Environment>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect changed tables, publish them and commit their fingerprints
    Run {
        /// Comma-separated tables to force, bypassing change detection
        #[arg(short, long)]
        tables: Option<String>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,

        /// Exit non-zero when any published count differs from the source
        #[arg(long)]
        fail_on_mismatch: bool,
    },

    /// Show what a run would process, without side effects
    Status {
        /// Comma-separated tables to force, bypassing change detection
        #[arg(short, long)]
        tables: Option<String>,
    },

    /// Print the committed fingerprint map
    State,

    /// Record current fingerprints without publishing
    Seed {
        /// Only write tables that have no stored fingerprint yet
        #[arg(long)]
        missing_only: bool,
    },
}

fn parse_environment(s: &str) -> Result<Environment, String> {
    s.parse::<Environment>().map_err(|e| e.to_string())
}

#[derive(Tabled)]
struct WorkRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("hashsync=debug,info")
    } else {
        EnvFilter::new("hashsync=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "✗ Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = Config::load(&cli.config)?;
    if let Some(env) = cli.env {
        config = config.with_environment(env)?;
    }
    info!("Environment: {}", config.environment);

    let runner = SyncRunner::from_config(&config)?;

    match cli.command {
        Commands::Run { tables, json, fail_on_mismatch } => {
            let overrides = parse_overrides(tables.as_deref());
            let summary = runner.run(&overrides).await;
            report_run(&summary, json)?;

            let failed = summary.has_any_failure() || (fail_on_mismatch && summary.mismatch_count() > 0);
            Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }

        Commands::Status { tables } => {
            let overrides = parse_overrides(tables.as_deref());
            let changes = runner.plan(&overrides).await?;

            if changes.work.is_empty() {
                println!("{}", "✓ Nothing to publish".green());
            } else {
                let rows: Vec<WorkRow> = changes
                    .work
                    .iter()
                    .map(|w| WorkRow {
                        table: w.table.to_string(),
                        reason: w.reason.to_string(),
                        fingerprint: w.current.short().to_string(),
                    })
                    .collect();
                let mut table = Table::new(rows);
                table.with(Style::markdown());
                println!("{}\n", table);
                println!("{} tables would be processed", changes.work.len());
            }

            for table in &changes.unknown {
                println!("{} {} is not in the catalog", "✗".red(), table);
            }
            if !changes.stale.is_empty() {
                println!("\n{} stored entries no longer in the catalog:", changes.stale.len());
                for table in &changes.stale {
                    println!("  {} {}", "○".dimmed(), table);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::State => {
            let stored = runner.store().get_all().await?;
            let mut rows: Vec<StateRow> = stored
                .iter()
                .map(|(table, fp)| StateRow {
                    table: table.to_string(),
                    fingerprint: fp.to_string(),
                })
                .collect();
            rows.sort_by(|a, b| a.table.cmp(&b.table));

            if rows.is_empty() {
                println!("No fingerprints committed in {}", runner.store().describe());
            } else {
                println!("{}\n", runner.store().describe());
                let mut table = Table::new(rows);
                table.with(Style::markdown());
                println!("{}", table);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Seed { missing_only } => {
            let report = runner.seed(missing_only).await?;
            println!("{} Seeded {} tables", "✓".green(), report.written.len());
            if !report.skipped.is_empty() {
                println!("  {} already had a fingerprint", report.skipped.len());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse_overrides(tables: Option<&str>) -> OverrideList {
    tables.map(OverrideList::parse).unwrap_or_else(OverrideList::none)
}

fn report_run(summary: &RunSummary, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    summary.log_summary();

    if !summary.entries.is_empty() {
        let mut table = Table::new(summary.rows());
        table.with(Style::markdown());
        println!("\n{}\n", table);
    }

    let status = summary.status();
    let line = format!("{} {}", status.symbol(), status.as_str());
    let line = match status {
        RunStatus::Failed | RunStatus::CompletedWithErrors => line.red(),
        RunStatus::CompletedWithAnomalies => line.yellow(),
        RunStatus::Succeeded => line.green(),
        RunStatus::NothingToDo => line.blue(),
    };
    println!("{}", line);

    for entry in summary.failures() {
        if let hashsync::Outcome::Failure { cause, .. } = &entry.outcome {
            println!("\n{} [{}]", entry.table, cause.code());
            for hint in cause.hint().lines() {
                println!("  {}", hint);
            }
            if cause.is_transient() {
                println!("  {}", "↻ likely to clear on the next run".dimmed());
            }
        }
    }
    Ok(())
}
