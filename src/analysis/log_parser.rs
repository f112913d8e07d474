//! Parser for `git log` output produced with [`pretty_format`] and `--stat`.
//!
//! Each commit is printed as a header wrapped in start/end markers, with its
//! fields joined by a separator token, followed by the `--stat` block whose
//! last line summarises the change:
//!
//! ```text
//! PRETTYFORMATSTART__<hash>__SEPARATOR__<author date>__SEPARATOR__...<body>__PRETTYFORMATEND
//!  src/main.rs | 6 +++---
//!  1 file changed, 3 insertions(+), 3 deletions(-)
//! ```

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::ParseError;
use crate::types::{Changes, Commit, Person};

pub const PRETTY_FORMAT_START: &str = "PRETTYFORMATSTART__";
pub const PRETTY_FORMAT_SEPARATOR: &str = "__SEPARATOR__";
pub const PRETTY_FORMAT_END: &str = "__PRETTYFORMATEND";

/// `git log --date` RFC 2822 style: "Sat, 8 Apr 2023 17:47:43 +0800".
/// The day of month carries no leading zero.
pub const GIT_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Placeholders in header order: hash, author date/name/email, committer
/// date/name/email, subject, body.
const HEADER_PLACEHOLDERS: [&str; 9] = ["%H", "%aD", "%aN", "%aE", "%cD", "%cN", "%cE", "%s", "%b"];

pub const HEADER_FIELD_COUNT: usize = HEADER_PLACEHOLDERS.len();

const SEGMENT_PREVIEW_CHARS: usize = 160;

static INSERTIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) insertions?\(\+\)").expect("valid insertions pattern"));
static DELETIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) deletions?\(-\)").expect("valid deletions pattern"));
static FILES_CHANGED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) files? changed").expect("valid files changed pattern"));

/// The `--pretty=format:` argument matching what this parser expects.
pub fn pretty_format() -> String {
    format!(
        "{}{}{}",
        PRETTY_FORMAT_START,
        HEADER_PLACEHOLDERS.join(PRETTY_FORMAT_SEPARATOR),
        PRETTY_FORMAT_END
    )
}

/// Turns raw log text into commits, in log order.
///
/// Parsing is all-or-nothing: a malformed header fails the whole call rather
/// than being skipped.
#[derive(Debug, Clone, Default)]
pub struct CommitLogParser {
    repo_name: String,
}

impl CommitLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp every parsed commit with `repo_name`.
    pub fn with_repo_name(repo_name: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
        }
    }

    pub fn parse(&self, log: &str) -> Result<Vec<Commit>, ParseError> {
        let mut commits = Vec::new();
        let mut next_start = log.find(PRETTY_FORMAT_START);

        let leading = &log[..next_start.unwrap_or(log.len())];
        if !leading.trim().is_empty() {
            return Err(ParseError::UnexpectedText {
                segment: preview(leading),
            });
        }

        while let Some(start) = next_start {
            let header_begin = start + PRETTY_FORMAT_START.len();
            let header_len = log[header_begin..]
                .find(PRETTY_FORMAT_END)
                .ok_or(ParseError::UnterminatedHeader { offset: start })?;
            let header_end = header_begin + header_len;

            let stat_begin = header_end + PRETTY_FORMAT_END.len();
            next_start = log[stat_begin..]
                .find(PRETTY_FORMAT_START)
                .map(|offset| stat_begin + offset);
            let stat_end = next_start.unwrap_or(log.len());

            let mut commit = parse_header(&log[header_begin..header_end])?;
            commit.changes = parse_stat_block(&log[stat_begin..stat_end])?;
            commit.repo_name = self.repo_name.clone();
            commits.push(commit);
        }

        debug!(commits = commits.len(), repo = %self.repo_name, "parsed commit log");
        Ok(commits)
    }
}

/// Parse `log` without a repository name.
pub fn parse_commit_log(log: &str) -> Result<Vec<Commit>, ParseError> {
    CommitLogParser::new().parse(log)
}

fn parse_header(header: &str) -> Result<Commit, ParseError> {
    let fields: Vec<&str> = header.split(PRETTY_FORMAT_SEPARATOR).collect();
    if fields.len() != HEADER_FIELD_COUNT {
        return Err(ParseError::FieldCount {
            segment: preview(header),
            expected: HEADER_FIELD_COUNT,
            found: fields.len(),
        });
    }

    Ok(Commit {
        id: fields[0].trim().to_string(),
        repo_name: String::new(),
        author: Person::new(fields[2], fields[3]),
        author_time: parse_timestamp(fields[1], header)?,
        committer: Person::new(fields[5], fields[6]),
        committer_time: parse_timestamp(fields[4], header)?,
        changes: Changes::default(),
        subject: fields[7].to_string(),
        body: fields[8].trim_end().to_string(),
    })
}

fn parse_timestamp(value: &str, header: &str) -> Result<i64, ParseError> {
    DateTime::parse_from_str(value.trim(), GIT_DATE_FORMAT)
        .map(|dt| dt.timestamp())
        .map_err(|source| ParseError::Timestamp {
            segment: preview(header),
            value: value.to_string(),
            source,
        })
}

/// Read the summary line at the bottom of a `--stat` block. Absent clauses
/// count as zero, which is what git prints for rename-only or empty commits.
fn parse_stat_block(block: &str) -> Result<Changes, ParseError> {
    let Some(summary) = block.lines().rev().find(|line| !line.trim().is_empty()) else {
        return Ok(Changes::default());
    };

    Ok(Changes::new(
        stat_count(summary, &INSERTIONS_RE)?,
        stat_count(summary, &DELETIONS_RE)?,
        stat_count(summary, &FILES_CHANGED_RE)?,
    ))
}

fn stat_count(summary: &str, pattern: &Regex) -> Result<u64, ParseError> {
    let Some(captures) = pattern.captures(summary) else {
        return Ok(0);
    };
    let digits = &captures[1];
    digits.parse().map_err(|_| ParseError::Count {
        segment: preview(summary),
        value: digits.to_string(),
    })
}

fn preview(text: &str) -> String {
    text.chars().take(SEGMENT_PREVIEW_CHARS).collect()
}
