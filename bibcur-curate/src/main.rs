//! bibcur-curate - command-line entry point
//!
//! One invocation runs one step of the yearly curation cycle over CSV files
//! and the SQLite history:
//! - `prepare` writes one editable artifact per department and attribute
//! - `collect` reads edited artifacts back and records the decisions
//! - `hierarchy` and `history` inspect the inputs and the recorded state

use anyhow::{Context, Result};
use bibcur_common::config::load_config;
use bibcur_common::{Attribute, HashLookup, RawTable};
use bibcur_curate::config::{history_db_path, init_logging};
use bibcur_curate::history::{history_from_table, history_to_table, load_history, save_history};
use bibcur_curate::workflow::artifact_file_stem;
use bibcur_curate::{CurationRun, HistoryStore, RunInputs, TagHierarchyBuilder};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::info;

/// Command-line arguments for bibcur-curate
#[derive(Parser, Debug)]
#[command(name = "bibcur-curate")]
#[command(about = "Carry curation decisions forward across reprocessing runs")]
#[command(version)]
struct Args {
    /// Config file (overrides BIBCUR_CONFIG and the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// History database file
    #[arg(long, global = true, env = "BIBCUR_HISTORY_DB")]
    history_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the allowed-tag hierarchy and write it as CSV
    Hierarchy {
        /// Organizational classification table
        #[arg(long)]
        org: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-apply history and write one artifact per department
    Prepare {
        #[arg(long)]
        org: PathBuf,

        /// Current attribution rows
        #[arg(long)]
        records: PathBuf,

        /// Publication id to stable hash lookup
        #[arg(long)]
        hashes: PathBuf,

        /// Directory receiving the artifacts and the run report
        #[arg(long)]
        out_dir: PathBuf,
    },

    /// Record the decisions found in edited artifacts
    Collect {
        #[arg(long)]
        org: PathBuf,

        #[arg(long)]
        hashes: PathBuf,

        /// Edited artifact files
        #[arg(required = true)]
        artifacts: Vec<PathBuf>,
    },

    /// Inspect or exchange the decision history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Entry counts and recorded conflicts
    Summary,

    /// Write every entry to CSV
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge a legacy history spreadsheet (CSV) into the database
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("Starting bibcur-curate v{}", env!("CARGO_PKG_VERSION"));
    let institute = &config.institute;
    let db_path = history_db_path(args.history_db.as_deref(), &config);

    match args.command {
        Command::Hierarchy { org, output } => {
            let hierarchy = TagHierarchyBuilder::new(institute).build(&read_table(&org)?)?;
            let table = hierarchy.to_table(&institute.choice_separator);
            match output {
                Some(path) => table.write_csv(&path)?,
                None => table.to_writer(std::io::stdout())?,
            }
        }

        Command::Prepare {
            org,
            records,
            hashes,
            out_dir,
        } => {
            let pool = open_history(&db_path).await?;
            let history = load_history(&pool).await?;

            let (org, records, hashes) =
                (read_table(&org)?, read_table(&records)?, read_table(&hashes)?);
            let inputs = RunInputs {
                org: &org,
                records: &records,
                hashes: &hashes,
            };
            let prepared = CurationRun::new(institute).prepare(&inputs, &history)?;

            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;
            for artifact in &prepared.artifacts {
                let path = out_dir.join(format!("{}.csv", artifact_file_stem(artifact)));
                artifact.to_table().write_csv(&path)?;
            }

            let report_path = out_dir.join(format!("run_{}.json", prepared.run_id));
            let report = serde_json::to_string_pretty(&prepared.summary())?;
            std::fs::write(&report_path, report)
                .with_context(|| format!("Failed to write {}", report_path.display()))?;

            info!(
                artifacts = prepared.artifacts.len(),
                undecided = prepared.undecided(),
                report = %report_path.display(),
                "Artifacts written"
            );
        }

        Command::Collect {
            org,
            hashes,
            artifacts,
        } => {
            let pool = open_history(&db_path).await?;
            let mut history = load_history(&pool).await?;

            let hierarchy = TagHierarchyBuilder::new(institute).build(&read_table(&org)?)?;
            let lookup = HashLookup::from_table(&read_table(&hashes)?, institute)?;
            let edited = artifacts
                .iter()
                .map(|path| read_table(path))
                .collect::<Result<Vec<_>>>()?;

            let summary =
                CurationRun::new(institute).collect(&edited, &lookup, &hierarchy, &mut history)?;
            let written = save_history(&pool, &history).await?;
            info!(written, "History saved");
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::History { action } => {
            let pool = open_history(&db_path).await?;
            let mut history = load_history(&pool).await?;
            match action {
                HistoryAction::Summary => print_summary(&history),
                HistoryAction::Export { output } => {
                    history_to_table(&history, institute).write_csv(&output)?;
                    info!(entries = history.len(), output = %output.display(), "History exported");
                }
                HistoryAction::Import { input } => {
                    let imported = history_from_table(&read_table(&input)?, institute)?;
                    let merge = history.merge(&imported);
                    save_history(&pool, &history).await?;
                    println!("{}", serde_json::to_string_pretty(&merge)?);
                }
            }
        }
    }

    Ok(())
}

async fn open_history(path: &Path) -> Result<SqlitePool> {
    info!("History database: {}", path.display());
    bibcur_common::db::init_database(path)
        .await
        .with_context(|| format!("Failed to open history database {}", path.display()))
}

fn read_table(path: &Path) -> Result<RawTable> {
    RawTable::read_csv(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_summary(history: &HistoryStore) {
    println!("entries: {}", history.len());
    for attribute in Attribute::ALL {
        println!("  {}: {}", attribute, history.count(attribute));
    }
    println!("conflicts on load: {}", history.conflicts().len());
    for conflict in history.conflicts() {
        println!(
            "  {}: kept '{}' over '{}'",
            conflict.key, conflict.kept, conflict.discarded
        );
    }
}
