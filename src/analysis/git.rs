use git2::Repository;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::log_parser::{pretty_format, CommitLogParser};
use crate::error::{Error, GitError};
use crate::types::Commit;

/// A repository located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Working directory, or the git directory itself for bare repositories
    pub workdir: PathBuf,
    /// Name stamped on every commit read from this repository
    pub name: String,
}

/// Find the repository containing `path`.
pub async fn discover_repository(path: &Path) -> Result<RepositoryInfo, GitError> {
    let path = path.to_path_buf();

    // Discovery walks the filesystem, keep it off the runtime threads
    spawn_blocking(move || {
        let repo = Repository::discover(&path)?;
        let workdir = repo
            .workdir()
            .unwrap_or_else(|| repo.path())
            .to_path_buf();
        let name = repository_name(&workdir);
        Ok(RepositoryInfo { workdir, name })
    })
    .await?
}

fn repository_name(workdir: &Path) -> String {
    let name = workdir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".git").map(str::to_string).unwrap_or(name)
}

/// Arguments for the `git log` invocation the parser understands.
pub fn git_log_args(repo: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--no-pager".into(), "-C".into(), repo.into(), "log".into()];
    args.extend(
        [
            "--no-merges".to_string(),
            "--branches".to_string(),
            "--remotes".to_string(),
            format!("--pretty=format:{}", pretty_format()),
            "--reverse".to_string(),
            "--date-order".to_string(),
            "HEAD".to_string(),
            "--stat".to_string(),
            "--stat-width".to_string(),
            "999".to_string(),
        ]
        .into_iter()
        .map(OsString::from),
    );
    args
}

/// Run `git log` on `repo` and return its raw output. The child process is
/// killed if the deadline passes or `cancel` fires first.
pub async fn read_log(
    repo: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String, GitError> {
    let child = Command::new("git")
        .args(git_log_args(repo))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GitError::Cancelled),
        output = tokio::time::timeout(timeout, child.wait_with_output()) => {
            output.map_err(|_| GitError::Timeout(timeout))??
        }
    };

    if !output.status.success() {
        return Err(GitError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    debug!(bytes = output.stdout.len(), "git log finished");
    Ok(String::from_utf8(output.stdout)?)
}

/// Read and parse every non-merge commit reachable from the repository's
/// branches and remotes, oldest first.
pub async fn read_commits(
    repo_path: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<Commit>, Error> {
    let start_time = Instant::now();
    let repo = discover_repository(repo_path).await?;
    info!(repo = %repo.name, path = %repo.workdir.display(), "running git log");

    let log = read_log(&repo.workdir, timeout, cancel).await?;
    let commits = CommitLogParser::with_repo_name(repo.name.clone()).parse(&log)?;

    info!(
        repo = %repo.name,
        commits = commits.len(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "commit log parsed"
    );
    Ok(commits)
}
