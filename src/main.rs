//! Commit Statistics Tool
//!
//! Command-line front end: ingest a repository's history into a SQLite
//! database, then compare the corporate domain group with the community.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commitstats::config::load_repository_list;
use commitstats::pipeline::{
    create_output_dir, ingest_repository, report_database, run_batch, write_csv,
    write_detail_csvs,
};
use commitstats::{AnalysisConfig, DomainGroups};

#[derive(Parser, Debug)]
#[command(name = "commitstats", version)]
#[command(about = "Compare contributor groups in a repository's commit history")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    log_level: String,

    /// Analysis settings (JSON). Defaults to the per-user config file if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a repository's commit history into the database
    Ingest {
        /// SQLite database, created if missing
        #[arg(long)]
        db: PathBuf,

        /// Repository to read (any path inside it works)
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },

    /// Compare the corporate group with everyone else and write CSV files
    Report {
        #[arg(long)]
        db: PathBuf,

        /// JSON object mapping group names to domain regexes
        #[arg(long)]
        groups: PathBuf,

        /// Group treated as corporate (overrides the config file)
        #[arg(long)]
        corporate: Option<String>,

        /// Directory the CSV files are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Name used in the summary row and output file names
        #[arg(long)]
        name: Option<String>,
    },

    /// Ingest and report every repository in a list, one after another
    Batch {
        /// JSON array of local repository paths
        #[arg(long)]
        repos: PathBuf,

        #[arg(long)]
        groups: PathBuf,

        #[arg(long)]
        corporate: Option<String>,

        /// Directory for the databases and CSV files
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();

    let mut config =
        AnalysisConfig::load(cli.config.as_deref()).context("loading analysis config")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Ingest { db, repo } => {
            ingest_repository(&repo, &db, &config, &cancel)
                .await
                .with_context(|| format!("ingesting {} into {}", repo.display(), db.display()))?;
            Ok(())
        }
        Command::Report {
            db,
            groups,
            corporate,
            out_dir,
            name,
        } => {
            if let Some(corporate) = corporate {
                config.corporate_group = corporate;
            }
            report(&db, &groups, &out_dir, name, &config, &cancel).await
        }
        Command::Batch {
            repos,
            groups,
            corporate,
            out_dir,
        } => {
            if let Some(corporate) = corporate {
                config.corporate_group = corporate;
            }
            let repos = load_repository_list(&repos)
                .with_context(|| format!("loading repository list from {}", repos.display()))?;
            let groups = load_groups(&groups)?;

            let outcome = run_batch(&repos, &groups, &out_dir, &config, &cancel).await?;
            info!(
                repositories = outcome.repositories.len(),
                summary = %outcome.summary_path.display(),
                "batch complete"
            );
            Ok(())
        }
    }
}

fn load_groups(path: &Path) -> Result<DomainGroups> {
    DomainGroups::load(path).with_context(|| format!("loading domain groups from {}", path.display()))
}

async fn report(
    db: &Path,
    groups: &Path,
    out_dir: &Path,
    name: Option<String>,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let groups = load_groups(groups)?;
    let report = report_database(db, groups, config, cancel)
        .await
        .with_context(|| format!("reporting on {}", db.display()))?;
    println!("{}", report.domain_groups);

    let name = name.unwrap_or_else(|| {
        db.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repository".to_string())
    });

    create_output_dir(out_dir)?;
    write_csv(
        &out_dir.join(format!("{name}_summary.csv")),
        &report.summary_rows(&name, true),
    )?;
    write_detail_csvs(&report, &name, out_dir)?;
    Ok(())
}
