//! Ingest and report steps behind the command-line subcommands, and the
//! batch run that chains them over a list of repositories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analysis::git::discover_repository;
use crate::analysis::read_commits;
use crate::config::{AnalysisConfig, DomainGroups};
use crate::error::{Error, StoreError};
use crate::report::{to_csv, CorporateReport};
use crate::store::{CommitStore, SqliteStore};

/// Combined summary written by [`run_batch`], one row per repository.
pub const BATCH_SUMMARY_FILE: &str = "corpreport.csv";

/// Read `repo`'s history and upsert it into the database at `db`. Returns the
/// number of commits read.
pub async fn ingest_repository(
    repo: &Path,
    db: &Path,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<usize, Error> {
    let commits = read_commits(repo, config.git_timeout(), cancel).await?;
    let count = commits.len();

    let store = SqliteStore::open(db)?;
    spawn_blocking(move || store.add_commits(&commits))
        .await
        .map_err(StoreError::from)??;

    info!(commits = count, db = %db.display(), "ingest complete");
    Ok(count)
}

/// Run the corporate report over the commits stored at `db`.
pub async fn report_database(
    db: &Path,
    groups: DomainGroups,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<CorporateReport, Error> {
    let store: Arc<dyn CommitStore> = Arc::new(SqliteStore::open(db)?);
    CorporateReport::generate(&store, groups, config, cancel).await
}

pub fn write_csv(path: &Path, rows: &[Vec<String>]) -> Result<(), Error> {
    fs::write(path, to_csv(rows)).map_err(|source| Error::Output {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows = rows.len(), "wrote report");
    Ok(())
}

/// Write `{name}_changes.csv` and `{name}_survival.csv` into `out_dir`.
pub fn write_detail_csvs(report: &CorporateReport, name: &str, out_dir: &Path) -> Result<(), Error> {
    write_csv(&out_dir.join(format!("{name}_changes.csv")), &report.changes_rows())?;
    write_csv(&out_dir.join(format!("{name}_survival.csv")), &report.survival_rows())
}

pub fn create_output_dir(out_dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(out_dir).map_err(|source| Error::Output {
        path: out_dir.to_path_buf(),
        source,
    })
}

/// What a batch run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Names used for each repository's files, in input order
    pub repositories: Vec<String>,
    pub summary_path: PathBuf,
}

/// Ingest and report each repository in turn.
///
/// Every repository gets `{name}.db`, `{name}_changes.csv` and
/// `{name}_survival.csv` in `out_dir`, and one row in [`BATCH_SUMMARY_FILE`],
/// which carries the header once. The summary is rewritten after each
/// repository, so rows of repositories already processed survive a failure
/// later in the batch. The first failure stops the run.
pub async fn run_batch(
    repos: &[PathBuf],
    groups: &DomainGroups,
    out_dir: &Path,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<BatchOutcome, Error> {
    create_output_dir(out_dir)?;
    let summary_path = out_dir.join(BATCH_SUMMARY_FILE);
    let mut summary: Vec<Vec<String>> = Vec::new();
    let mut names: Vec<String> = Vec::with_capacity(repos.len());

    for repo in repos {
        let start_time = Instant::now();
        let found = discover_repository(repo).await?;
        let name = unique_name(&found.name, &names);
        info!(repo = %name, path = %found.workdir.display(), "beginning analysis");

        let db = out_dir.join(format!("{name}.db"));
        ingest_repository(&found.workdir, &db, config, cancel).await?;
        let report = report_database(&db, groups.clone(), config, cancel).await?;

        summary.extend(report.summary_rows(&name, names.is_empty()));
        write_csv(&summary_path, &summary)?;
        write_detail_csvs(&report, &name, out_dir)?;

        info!(
            repo = %name,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "analysis complete"
        );
        names.push(name);
    }

    Ok(BatchOutcome {
        repositories: names,
        summary_path,
    })
}

/// `name`, or `name-2`, `name-3`, ... when an earlier repository took it.
fn unique_name(name: &str, taken: &[String]) -> String {
    let base = if name.is_empty() { "repository" } else { name };
    if !taken.iter().any(|t| t == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}
