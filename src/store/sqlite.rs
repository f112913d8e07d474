//! SQLite-backed commit store.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::CommitStore;
use crate::error::StoreError;
use crate::types::{Changes, Commit, Person};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS commits (
        id TEXT PRIMARY KEY ON CONFLICT REPLACE,
        repo_name TEXT NOT NULL,
        author_name TEXT NOT NULL,
        author_email TEXT NOT NULL,
        author_time INTEGER NOT NULL,
        committer_name TEXT NOT NULL,
        committer_email TEXT NOT NULL,
        committer_time INTEGER NOT NULL,
        num_insertions INTEGER NOT NULL,
        num_deletions INTEGER NOT NULL,
        num_files_changed INTEGER NOT NULL,
        subject TEXT NOT NULL,
        body TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_commits_repo_name ON commits(repo_name);
    CREATE INDEX IF NOT EXISTS idx_commits_author_name ON commits(author_name);
    CREATE INDEX IF NOT EXISTS idx_commits_author_email ON commits(author_email);
    CREATE INDEX IF NOT EXISTS idx_commits_author_time ON commits(author_time);
    CREATE INDEX IF NOT EXISTS idx_commits_committer_name ON commits(committer_name);
    CREATE INDEX IF NOT EXISTS idx_commits_committer_email ON commits(committer_email);
";

const SELECT_COLUMNS: &str = "SELECT id, repo_name, author_name, author_email, author_time,
        committer_name, committer_email, committer_time,
        num_insertions, num_deletions, num_files_changed, subject, body
    FROM commits";

/// Commit store persisted in a single SQLite database file.
///
/// The connection is guarded by a mutex; concurrent queries from worker tasks
/// are serialized at the connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.setup()?;
        debug!(path = %path.display(), "opened commit database");
        Ok(store)
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.setup()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    fn query_commits(
        &self,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Commit>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("{SELECT_COLUMNS} {filter} ORDER BY author_time, id");
        let mut stmt = conn.prepare(&sql)?;
        let commits = stmt
            .query_map(args, commit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(commits)
    }
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<Commit> {
    let count = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)?.max(0) as u64) };

    Ok(Commit {
        id: row.get(0)?,
        repo_name: row.get(1)?,
        author: Person::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        author_time: row.get(4)?,
        committer: Person::new(row.get::<_, String>(5)?, row.get::<_, String>(6)?),
        committer_time: row.get(7)?,
        changes: Changes::new(count(8)?, count(9)?, count(10)?),
        subject: row.get(11)?,
        body: row.get(12)?,
    })
}

impl CommitStore for SqliteStore {
    fn setup(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn add_commits(&self, commits: &[Commit]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO commits
                 (id, repo_name, author_name, author_email, author_time,
                  committer_name, committer_email, committer_time,
                  num_insertions, num_deletions, num_files_changed, subject, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for commit in commits {
                stmt.execute(params![
                    &commit.id,
                    &commit.repo_name,
                    &commit.author.name,
                    &commit.author.email,
                    commit.author_time,
                    &commit.committer.name,
                    &commit.committer.email,
                    commit.committer_time,
                    commit.changes.insertions() as i64,
                    commit.changes.deletions() as i64,
                    commit.changes.files_changed as i64,
                    &commit.subject,
                    &commit.body,
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = commits.len(), "stored commits");
        Ok(())
    }

    fn commit(&self, id: &str) -> Result<Option<Commit>, StoreError> {
        let conn = self.conn()?;
        let commit = conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], commit_from_row)
            .optional()?;
        Ok(commit)
    }

    fn commits(&self) -> Result<Vec<Commit>, StoreError> {
        self.query_commits("", [])
    }

    fn authors(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT author_email FROM commits ORDER BY author_email")?;
        let authors = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(authors)
    }

    fn author_commits(&self, email: &str) -> Result<Vec<Commit>, StoreError> {
        self.query_commits("WHERE author_email = ?1", params![email])
    }

    fn commits_matching_author_domain(&self, domain: &str) -> Result<Vec<Commit>, StoreError> {
        self.query_commits("WHERE author_email LIKE '%' || ?1", params![domain])
    }
}
