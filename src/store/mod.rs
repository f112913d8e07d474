//! Persistent storage of parsed commits.
//!
//! The analysis only depends on the [`CommitStore`] contract. [`SqliteStore`]
//! is the on-disk implementation used by the binary; [`MemoryStore`] keeps
//! everything in a map and is handy for tests and one-off analysis.

mod sqlite;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::types::Commit;

pub use sqlite::SqliteStore;

/// Keyed storage of commits with author and domain lookups.
///
/// Implementations are used from blocking worker tasks, so every method takes
/// `&self` and the store must be shareable across threads.
pub trait CommitStore: Send + Sync {
    /// Create the schema if it does not exist yet. Safe to call repeatedly.
    fn setup(&self) -> Result<(), StoreError>;

    /// Upsert a batch by commit id, last write wins. Either every commit is
    /// stored or none is.
    fn add_commits(&self, commits: &[Commit]) -> Result<(), StoreError>;

    fn commit(&self, id: &str) -> Result<Option<Commit>, StoreError>;

    fn commits(&self) -> Result<Vec<Commit>, StoreError>;

    /// Distinct author emails across every stored commit.
    fn authors(&self) -> Result<Vec<String>, StoreError>;

    fn author_commits(&self, email: &str) -> Result<Vec<Commit>, StoreError>;

    /// Commits whose author email ends with `domain`, compared without regard
    /// to ASCII case. This is a suffix scan, so `ample.com` also returns
    /// commits from `example.com`; callers needing an exact domain filter the
    /// result.
    fn commits_matching_author_domain(&self, domain: &str) -> Result<Vec<Commit>, StoreError>;
}

/// Deadline and cancellation applied to every blocking store query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl QueryContext {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), CancellationToken::new())
    }
}

/// Run `query` against `store` on the blocking pool, bounded by the
/// context's deadline and cancellation token.
pub async fn run_query<T, F>(
    store: &Arc<dyn CommitStore>,
    ctx: &QueryContext,
    query: F,
) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn CommitStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    let task = spawn_blocking(move || query(store.as_ref()));

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(StoreError::Cancelled),
        joined = tokio::time::timeout(ctx.timeout, task) => match joined {
            Ok(result) => result?,
            Err(_) => Err(StoreError::Timeout(ctx.timeout)),
        },
    }
}

/// In-memory [`CommitStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    commits: RwLock<BTreeMap<String, Commit>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `commits`.
    pub fn with_commits(commits: impl IntoIterator<Item = Commit>) -> Self {
        Self {
            commits: RwLock::new(
                commits
                    .into_iter()
                    .map(|commit| (commit.id.clone(), commit))
                    .collect(),
            ),
        }
    }

    fn filtered(&self, keep: impl Fn(&Commit) -> bool) -> Result<Vec<Commit>, StoreError> {
        let commits = self.commits.read().map_err(|_| StoreError::Lock)?;
        Ok(commits.values().filter(|c| keep(c)).cloned().collect())
    }
}

impl CommitStore for MemoryStore {
    fn setup(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn add_commits(&self, commits: &[Commit]) -> Result<(), StoreError> {
        let mut stored = self.commits.write().map_err(|_| StoreError::Lock)?;
        for commit in commits {
            stored.insert(commit.id.clone(), commit.clone());
        }
        Ok(())
    }

    fn commit(&self, id: &str) -> Result<Option<Commit>, StoreError> {
        let commits = self.commits.read().map_err(|_| StoreError::Lock)?;
        Ok(commits.get(id).cloned())
    }

    fn commits(&self) -> Result<Vec<Commit>, StoreError> {
        self.filtered(|_| true)
    }

    fn authors(&self) -> Result<Vec<String>, StoreError> {
        let commits = self.commits.read().map_err(|_| StoreError::Lock)?;
        let mut authors: Vec<String> = commits.values().map(|c| c.author.email.clone()).collect();
        authors.sort();
        authors.dedup();
        Ok(authors)
    }

    fn author_commits(&self, email: &str) -> Result<Vec<Commit>, StoreError> {
        self.filtered(|c| c.author.email == email)
    }

    fn commits_matching_author_domain(&self, domain: &str) -> Result<Vec<Commit>, StoreError> {
        let domain = domain.to_ascii_lowercase();
        self.filtered(|c| c.author.email.to_ascii_lowercase().ends_with(&domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Changes, Person};
    use pretty_assertions::assert_eq;

    pub(crate) fn commit(id: &str, email: &str, insertions: u64) -> Commit {
        Commit {
            id: id.to_string(),
            repo_name: "test-repo".to_string(),
            author: Person::new("Someone", email),
            author_time: 1_680_947_263,
            committer: Person::new("Someone", email),
            committer_time: 1_680_947_263,
            changes: Changes::new(insertions, 1, 1),
            subject: format!("Commit {id}"),
            body: String::new(),
        }
    }

    /// Runs the shared contract checks against any store implementation.
    pub(crate) fn exercise_store_contract(store: &dyn CommitStore) {
        store.setup().unwrap();
        store.setup().unwrap();

        store
            .add_commits(&[
                commit("a", "dev@claudiocambra.com", 1),
                commit("b", "bigwig@corpdomain.com", 2),
                commit("c", "dev@claudiocambra.com", 3),
                commit("d", "someone@example.com", 4),
            ])
            .unwrap();
        store.add_commits(&[commit("a", "dev@claudiocambra.com", 10)]).unwrap();

        assert_eq!(store.commits().unwrap().len(), 4);
        assert_eq!(store.commit("a").unwrap().unwrap().changes.insertions(), 10);
        assert!(store.commit("missing").unwrap().is_none());

        let mut authors = store.authors().unwrap();
        authors.sort();
        assert_eq!(
            authors,
            vec!["bigwig@corpdomain.com", "dev@claudiocambra.com", "someone@example.com"]
        );

        let mut ids: Vec<String> = store
            .author_commits("dev@claudiocambra.com")
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);

        assert_eq!(store.commits_matching_author_domain("corpdomain.com").unwrap().len(), 1);
        assert_eq!(store.commits_matching_author_domain("CorpDomain.com").unwrap().len(), 1);
        // suffix scan, not an exact domain match
        assert_eq!(store.commits_matching_author_domain("ample.com").unwrap().len(), 1);
        assert!(store.commits_matching_author_domain("nowhere.org").unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_contract() {
        exercise_store_contract(&MemoryStore::new());
    }

    #[tokio::test]
    async fn test_run_query_returns_result() {
        let store: Arc<dyn CommitStore> =
            Arc::new(MemoryStore::with_commits(vec![commit("a", "a@example.com", 1)]));
        let count = run_query(&store, &QueryContext::default(), |s| Ok(s.commits()?.len()))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_run_query_cancelled() {
        let store: Arc<dyn CommitStore> = Arc::new(MemoryStore::new());
        let ctx = QueryContext::default();
        ctx.cancel.cancel();

        let result = run_query(&store, &ctx, |_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_query_times_out() {
        let store: Arc<dyn CommitStore> = Arc::new(MemoryStore::new());
        let ctx = QueryContext::new(Duration::from_millis(10), CancellationToken::new());

        let result = run_query(&store, &ctx, |_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }
}
