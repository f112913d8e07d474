//! Error types for commit ingestion and analysis.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn `git log` output into commits.
///
/// `segment` is the (possibly truncated) header text that could not be parsed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected {expected} fields but found {found} in commit header: {segment}")]
    FieldCount {
        segment: String,
        expected: usize,
        found: usize,
    },
    #[error("unparsable timestamp {value:?} in commit header: {segment}")]
    Timestamp {
        segment: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("commit header starting at byte {offset} has no end marker")]
    UnterminatedHeader { offset: usize },
    #[error("unexpected text before the first commit header: {segment}")]
    UnexpectedText { segment: String },
    #[error("invalid change count {value:?} in stat line: {segment}")]
    Count { segment: String, value: String },
}

/// Failure of the persistent commit store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store connection lock was poisoned")]
    Lock,
    #[error("store query task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("store query exceeded {0:?}")]
    Timeout(std::time::Duration),
    #[error("store query was cancelled")]
    Cancelled,
    #[error("query worker pool closed: {0}")]
    Pool(#[from] tokio::sync::AcquireError),
}

/// Failure to load analysis or domain-group configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid pattern {pattern:?} in group {group:?}: {source}")]
    Pattern {
        group: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("no domain group named {0:?} is configured")]
    MissingGroup(String),
}

/// Failure to extract the commit log from a repository.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository: {0}")]
    Repository(#[from] git2::Error),
    #[error("could not run git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("git log exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("git log did not finish within {0:?}")]
    Timeout(std::time::Duration),
    #[error("git log was cancelled")]
    Cancelled,
    #[error("git log produced invalid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("repository task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("could not write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_field_count_display_names_segment() {
        let err = ParseError::FieldCount {
            segment: "abc__SEPARATOR__def".to_string(),
            expected: 9,
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 9"));
        assert!(msg.contains("found 2"));
        assert!(msg.contains("abc__SEPARATOR__def"));
    }

    #[test]
    fn test_timestamp_error_keeps_source() {
        let source = chrono::DateTime::parse_from_str("garbage", "%Y").unwrap_err();
        let err = ParseError::Timestamp {
            segment: "header".to_string(),
            value: "garbage".to_string(),
            source,
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("\"garbage\""));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: Error = StoreError::from(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(err, Error::Store(StoreError::Sqlite(_))));
        assert!(err.to_string().contains("SQLite error"));
    }

    #[test]
    fn test_result_propagation() {
        fn inner() -> Result<()> {
            Err(ParseError::UnterminatedHeader { offset: 42 }.into())
        }

        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert!(matches!(
            err,
            Error::Parse(ParseError::UnterminatedHeader { offset: 42 })
        ));
    }
}
