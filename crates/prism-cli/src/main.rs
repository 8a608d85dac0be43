mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prism_storage::{
    BackfillOptions, EvolutionConfig, EvolutionProgress, EvolutionReport, ProfileStore,
    DEFAULT_BATCH_SIZE,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "prism")]
#[command(about = "Profile store maintenance", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "PRISM_DB_PATH")]
    db: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or adopt the store, evolve it and seed the default profile
    Init,
    /// Add stable identifiers and relink observations
    Migrate {
        /// Rows identified per committed transaction
        #[arg(long, env = "PRISM_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Stop after this many batches per table; run again to resume
        #[arg(long)]
        max_batches: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Show what the migration still has to do
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let db_path = config::resolve_db_path(cli.db.as_deref())?;
    let store = open_store(&db_path)?;

    match cli.command {
        Commands::Init => {
            let report = store
                .evolve(&EvolutionConfig::default())
                .context("Failed to evolve schema")?;
            let seeded = store
                .seed_defaults()
                .context("Failed to seed default profile")?;
            info!(path = %db_path.display(), "store initialized");

            println!("Database: {}", db_path.display());
            print_report(&report);
            println!(
                "Default user {} ({}), {} new profile sections, session {} ({})",
                seeded.user_id,
                if seeded.user_created { "created" } else { "existing" },
                seeded.sections_created,
                seeded.session_id,
                if seeded.session_created { "created" } else { "existing" },
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate {
            batch_size,
            max_batches,
            json,
        } => {
            let config = EvolutionConfig {
                backfill: BackfillOptions {
                    batch_size,
                    max_batches,
                },
            };
            let report = store.evolve(&config).context("Migration failed")?;

            if json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { json } => {
            let progress = store.progress().context("Failed to read migration status")?;

            if json {
                print_json(&progress)?;
            } else {
                print_progress(&progress);
            }
            Ok(if progress.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("PRISM_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(path: &Path) -> Result<ProfileStore> {
    ProfileStore::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode report")?;
    println!("{out}");
    Ok(())
}

fn print_report(report: &EvolutionReport) {
    for step in &report.steps {
        println!(
            "{:<20} ddl={} rows={} remaining={}",
            step.step.as_str(),
            step.ddl_applied,
            step.rows_updated,
            step.remaining
        );
    }
    match report.stopped_after {
        Some(step) => println!("Stopped after {step}; run `prism migrate` again to resume"),
        None if report.is_noop() => {
            println!("Nothing to do (schema version {})", report.schema_version)
        }
        None => println!("Schema version {}", report.schema_version),
    }
}

fn print_progress(progress: &EvolutionProgress) {
    println!("Schema version: {}", progress.schema_version);
    for column in &progress.identifiers {
        println!(
            "{}.{}: {} unset, {} duplicated, unique index {}",
            column.table,
            column.column,
            column.unset,
            column.duplicated,
            if column.unique_index { "present" } else { "missing" }
        );
    }
    println!(
        "Observations waiting for relink: {}",
        progress.relinkable_references
    );
    println!(
        "Observations with a missing source message: {}",
        progress.unresolved_references
    );
    println!(
        "{}",
        if progress.is_complete() {
            "Migration complete"
        } else {
            "Migration incomplete"
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_flags_parse() {
        let cli = Cli::try_parse_from([
            "prism",
            "--db",
            "/tmp/profile.db",
            "migrate",
            "--batch-size",
            "50",
            "--max-batches",
            "2",
            "--json",
        ])
        .expect("parse");

        assert_eq!(cli.db, Some(PathBuf::from("/tmp/profile.db")));
        match cli.command {
            Commands::Migrate {
                batch_size,
                max_batches,
                json,
            } => {
                assert_eq!(batch_size, 50);
                assert_eq!(max_batches, Some(2));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["prism", "status", "--verbose", "--db", "x.db"])
            .expect("parse");
        assert!(cli.verbose);
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        assert!(matches!(cli.command, Commands::Status { json: false }));
    }

    #[test]
    fn batch_size_must_be_a_number() {
        assert!(Cli::try_parse_from(["prism", "migrate", "--batch-size", "many"]).is_err());
        assert!(Cli::try_parse_from(["prism"]).is_err());
    }

    #[test]
    fn init_then_status_reports_complete() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("profile.db");

        let store = open_store(&path).expect("open");
        store
            .evolve(&EvolutionConfig::default())
            .expect("evolve");
        let seeded = store.seed_defaults().expect("seed");
        assert!(seeded.user_created);
        drop(store);

        let progress = open_store(&path)
            .expect("reopen")
            .progress()
            .expect("progress");
        assert!(progress.is_complete());
        let json = serde_json::to_value(&progress).expect("json");
        assert_eq!(json["identifiers"][0]["table"], "chat_sessions");
    }
}
