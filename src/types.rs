//! # Common Types
//!
//! This module contains the records produced by the commit log parser and the
//! change counters attached to them.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// An author or committer identity as recorded by git.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    /// Display name
    pub name: String,
    /// Email address, not necessarily well formed
    pub email: String,
}

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Inserted and deleted line counts.
///
/// Subtraction saturates at zero so a counter can never go negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineChanges {
    /// Number of inserted lines
    pub insertions: u64,
    /// Number of deleted lines
    pub deletions: u64,
}

impl LineChanges {
    pub fn new(insertions: u64, deletions: u64) -> Self {
        Self {
            insertions,
            deletions,
        }
    }
}

impl Add for LineChanges {
    type Output = LineChanges;

    fn add(self, rhs: LineChanges) -> LineChanges {
        LineChanges {
            insertions: self.insertions.saturating_add(rhs.insertions),
            deletions: self.deletions.saturating_add(rhs.deletions),
        }
    }
}

impl Sub for LineChanges {
    type Output = LineChanges;

    fn sub(self, rhs: LineChanges) -> LineChanges {
        LineChanges {
            insertions: self.insertions.saturating_sub(rhs.insertions),
            deletions: self.deletions.saturating_sub(rhs.deletions),
        }
    }
}

/// Line changes plus the number of files touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Changes {
    #[serde(flatten)]
    pub line_changes: LineChanges,
    /// Number of files changed
    pub files_changed: u64,
}

impl Changes {
    pub fn new(insertions: u64, deletions: u64, files_changed: u64) -> Self {
        Self {
            line_changes: LineChanges::new(insertions, deletions),
            files_changed,
        }
    }

    pub fn insertions(&self) -> u64 {
        self.line_changes.insertions
    }

    pub fn deletions(&self) -> u64 {
        self.line_changes.deletions
    }
}

impl Add for Changes {
    type Output = Changes;

    fn add(self, rhs: Changes) -> Changes {
        Changes {
            line_changes: self.line_changes + rhs.line_changes,
            files_changed: self.files_changed.saturating_add(rhs.files_changed),
        }
    }
}

impl Sub for Changes {
    type Output = Changes;

    fn sub(self, rhs: Changes) -> Changes {
        Changes {
            line_changes: self.line_changes - rhs.line_changes,
            files_changed: self.files_changed.saturating_sub(rhs.files_changed),
        }
    }
}

/// A single parsed changeset.
///
/// Commits are created once by the parser and never mutated afterwards. Two
/// commits with the same `id` are the same commit; the store keeps the one
/// written last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash
    pub id: String,
    /// Name of the repository the commit was read from
    pub repo_name: String,
    pub author: Person,
    /// Author timestamp in seconds since the Unix epoch
    pub author_time: i64,
    pub committer: Person,
    /// Committer timestamp in seconds since the Unix epoch
    pub committer_time: i64,
    #[serde(flatten)]
    pub changes: Changes,
    /// First line of the commit message
    pub subject: String,
    /// Remainder of the commit message
    pub body: String,
}

impl Commit {
    pub fn author_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.author_time, 0)
    }

    /// Calendar year of the author timestamp, in UTC.
    pub fn author_year(&self) -> Option<i32> {
        self.author_datetime().map(|dt| dt.year())
    }

    /// (year, month) of the author timestamp, in UTC. Months are 1-based.
    pub fn author_year_month(&self) -> Option<(i32, u32)> {
        self.author_datetime().map(|dt| (dt.year(), dt.month()))
    }

    pub fn author_domain(&self) -> Option<&str> {
        email_domain(&self.author.email)
    }

    pub fn line_changes(&self) -> LineChanges {
        self.changes.line_changes
    }

    /// Subject and body joined the way they are matched against text patterns.
    pub fn message(&self) -> String {
        format!("{}\n{}", self.subject, self.body)
    }
}

/// Domain part of an email address: everything after the last `@`.
///
/// Returns `None` when there is no `@` or nothing follows it.
pub fn email_domain(email: &str) -> Option<&str> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}
