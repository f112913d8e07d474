//! Aggregation of authors and their changes by email domain, and by named
//! groups of domains.
//!
//! Every distinct author domain gets its own [`DomainAccumulator`]. Groups are
//! never stored; they are assembled on request by merging the accumulators of
//! every domain matching the group's patterns. The "unknown" group is whatever
//! is left of the repository totals once every named group's domains are
//! taken out.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{AnalysisConfig, DomainGroups};
use crate::error::StoreError;
use crate::store::{run_query, CommitStore, QueryContext};
use crate::types::{email_domain, Changes, Commit, LineChanges};
use crate::utils::{CommitMap, EmailSet, YearlyEmailMap, YearlyLineChangeMap};

/// Label of the bucket holding authors whose email has no usable domain.
pub const UNKNOWN_DOMAIN: &str = "unknown-domain";

/// Name of the group of authors not claimed by any named group.
pub const UNKNOWN_GROUP: &str = "unknown";

/// Key of a per-domain accumulator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DomainKey {
    Domain(String),
    /// No `@`, or nothing after it. Never matched by group patterns.
    Unknown,
}

impl DomainKey {
    pub fn for_email(email: &str) -> Self {
        match email_domain(email) {
            Some(domain) => DomainKey::Domain(domain.to_string()),
            None => DomainKey::Unknown,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DomainKey::Domain(domain) => domain,
            DomainKey::Unknown => UNKNOWN_DOMAIN,
        }
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authors, counters and commits attributed to one domain (or to any union of
/// domains).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAccumulator {
    pub authors: EmailSet,
    pub changes: Changes,
    pub yearly_line_changes: YearlyLineChangeMap,
    pub yearly_authors: YearlyEmailMap,
    pub commits: CommitMap,
}

impl DomainAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_commits(commits: impl IntoIterator<Item = Commit>) -> Self {
        Self::from_commit_map(commits.into_iter().collect())
    }

    pub fn from_commit_map(commits: CommitMap) -> Self {
        let authors = commits.commits().map(|c| c.author.email.clone()).collect();
        let changes = commits
            .commits()
            .fold(Changes::default(), |total, c| total + c.changes);
        let yearly_line_changes = commits
            .commits()
            .filter_map(|c| c.author_year().map(|year| (year, c.line_changes())))
            .collect();
        let yearly_authors = commits
            .commits()
            .filter_map(|c| c.author_year().map(|year| (year, c.author.email.clone())))
            .collect();

        Self {
            authors,
            changes,
            yearly_line_changes,
            yearly_authors,
            commits,
        }
    }

    /// Sets are unioned and counters added. Counters assume the two sides do
    /// not share commits, which holds for accumulators of distinct domains.
    pub fn merge(&self, other: &DomainAccumulator) -> DomainAccumulator {
        DomainAccumulator {
            authors: self.authors.union(&other.authors),
            changes: self.changes + other.changes,
            yearly_line_changes: self.yearly_line_changes.merge(&other.yearly_line_changes),
            yearly_authors: self.yearly_authors.merge(&other.yearly_authors),
            commits: self.commits.union(&other.commits),
        }
    }

    /// Set difference for authors and commits, saturating subtraction for
    /// counters.
    pub fn subtract(&self, other: &DomainAccumulator) -> DomainAccumulator {
        DomainAccumulator {
            authors: self.authors.difference(&other.authors),
            changes: self.changes - other.changes,
            yearly_line_changes: self.yearly_line_changes.subtract(&other.yearly_line_changes),
            yearly_authors: self.yearly_authors.subtract(&other.yearly_authors),
            commits: self.commits.difference(&other.commits),
        }
    }

    pub fn line_changes(&self) -> LineChanges {
        self.changes.line_changes
    }
}

/// A group's share of the repository.
///
/// Percentages are relative to the repository totals and are NaN when the
/// corresponding total is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupData {
    pub name: String,
    pub authors: EmailSet,
    pub line_changes: LineChanges,
    pub files_changed: u64,
    pub yearly_line_changes: YearlyLineChangeMap,
    pub yearly_authors: YearlyEmailMap,
    pub commits: CommitMap,
    pub authors_percent: f64,
    pub insertions_percent: f64,
    pub deletions_percent: f64,
}

impl GroupData {
    fn new(name: impl Into<String>, group: DomainAccumulator, totals: &DomainAccumulator) -> Self {
        let line_changes = group.line_changes();
        let total_changes = totals.line_changes();

        Self {
            name: name.into(),
            authors_percent: percentage(group.authors.len() as u64, totals.authors.len() as u64),
            insertions_percent: percentage(line_changes.insertions, total_changes.insertions),
            deletions_percent: percentage(line_changes.deletions, total_changes.deletions),
            authors: group.authors,
            line_changes,
            files_changed: group.changes.files_changed,
            yearly_line_changes: group.yearly_line_changes,
            yearly_authors: group.yearly_authors,
            commits: group.commits,
        }
    }

    pub fn num_authors(&self) -> usize {
        self.authors.len()
    }
}

/// `part` as a percentage of `whole`; NaN when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        f64::NAN
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Per-domain and per-group breakdown of a commit corpus.
#[derive(Debug, Clone)]
pub struct DomainGroupsReport {
    groups: DomainGroups,
    domains: BTreeMap<DomainKey, DomainAccumulator>,
    totals: DomainAccumulator,
}

impl DomainGroupsReport {
    pub fn new(groups: DomainGroups) -> Self {
        Self {
            groups,
            domains: BTreeMap::new(),
            totals: DomainAccumulator::new(),
        }
    }

    pub fn groups(&self) -> &DomainGroups {
        &self.groups
    }

    /// Rebuild every accumulator from the store.
    ///
    /// Each domain is fetched by its own query; queries run concurrently, at
    /// most `config.max_parallel_queries` at a time, each bounded by the query
    /// timeout and `cancel`. Any failed query fails the whole run and leaves
    /// the report empty.
    pub async fn generate(
        &mut self,
        store: &Arc<dyn CommitStore>,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.reset();
        let ctx = QueryContext::new(config.query_timeout(), cancel.clone());

        let authors = run_query(store, &ctx, |s| s.authors()).await?;
        let mut emails_by_domain: BTreeMap<DomainKey, Vec<String>> = BTreeMap::new();
        for email in authors {
            emails_by_domain
                .entry(DomainKey::for_email(&email))
                .or_default()
                .push(email);
        }
        debug!(domains = emails_by_domain.len(), "aggregating commits by author domain");

        let semaphore = Arc::new(Semaphore::new(config.max_parallel_queries.max(1)));
        let mut tasks = JoinSet::new();

        for (key, emails) in emails_by_domain {
            let permit = semaphore.clone().acquire_owned().await?;
            let store = Arc::clone(store);
            let ctx = ctx.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let commits = fetch_domain_commits(&store, &ctx, &key, emails).await?;
                Ok::<_, StoreError>((key, commits))
            });
        }

        // Returning early drops the set, which aborts the queries still running
        let mut domains = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (key, commits) = joined??;
            debug!(domain = %key, commits = commits.len(), "aggregated domain");
            domains.insert(key, DomainAccumulator::from_commits(commits));
        }

        self.set_domains(domains);
        info!(
            authors = self.totals.authors.len(),
            commits = self.totals.commits.len(),
            domains = self.domains.len(),
            "domain groups report generated"
        );
        Ok(())
    }

    /// Rebuild every accumulator from an in-memory corpus.
    pub fn generate_from_commits(&mut self, commits: impl IntoIterator<Item = Commit>) {
        self.reset();

        let mut by_domain: BTreeMap<DomainKey, Vec<Commit>> = BTreeMap::new();
        for commit in commits {
            by_domain
                .entry(DomainKey::for_email(&commit.author.email))
                .or_default()
                .push(commit);
        }

        self.set_domains(
            by_domain
                .into_iter()
                .map(|(key, commits)| (key, DomainAccumulator::from_commits(commits)))
                .collect(),
        );
    }

    fn reset(&mut self) {
        self.domains.clear();
        self.totals = DomainAccumulator::new();
    }

    fn set_domains(&mut self, domains: BTreeMap<DomainKey, DomainAccumulator>) {
        self.totals = domains
            .values()
            .fold(DomainAccumulator::new(), |total, domain| total.merge(domain));
        self.domains = domains;
    }

    pub fn total_authors(&self) -> &EmailSet {
        &self.totals.authors
    }

    pub fn total_commits(&self) -> &CommitMap {
        &self.totals.commits
    }

    pub fn total_changes(&self) -> Changes {
        self.totals.changes
    }

    pub fn totals(&self) -> &DomainAccumulator {
        &self.totals
    }

    pub fn domains(&self) -> impl Iterator<Item = (&DomainKey, &DomainAccumulator)> {
        self.domains.iter()
    }

    pub fn domain(&self, key: &DomainKey) -> Option<&DomainAccumulator> {
        self.domains.get(key)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.names()
    }

    /// Domains claimed by `group`, in domain order.
    pub fn group_domains<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a DomainKey> + 'a {
        self.domains.keys().filter(move |key| match key {
            DomainKey::Domain(domain) => self.groups.matches(group, domain),
            DomainKey::Unknown => false,
        })
    }

    /// Union of the accumulators of every domain matching `name`'s patterns.
    /// `None` when no such group is configured.
    pub fn group_data(&self, name: &str) -> Option<GroupData> {
        if !self.groups.contains(name) {
            return None;
        }

        let group = self.merge_domains(self.group_domains(name));
        Some(GroupData::new(name, group, &self.totals))
    }

    /// Everything in the repository not claimed by any named group.
    pub fn unknown_group_data(&self) -> GroupData {
        let known_domains: BTreeSet<&DomainKey> = self
            .groups
            .names()
            .flat_map(|group| self.group_domains(group))
            .collect();
        let known = self.merge_domains(known_domains);

        GroupData::new(UNKNOWN_GROUP, self.totals.subtract(&known), &self.totals)
    }

    fn merge_domains<'a>(&'a self, keys: impl IntoIterator<Item = &'a DomainKey>) -> DomainAccumulator {
        keys.into_iter()
            .filter_map(|key| self.domains.get(key))
            .fold(DomainAccumulator::new(), |group, domain| group.merge(domain))
    }
}

async fn fetch_domain_commits(
    store: &Arc<dyn CommitStore>,
    ctx: &QueryContext,
    key: &DomainKey,
    emails: Vec<String>,
) -> Result<Vec<Commit>, StoreError> {
    match key {
        DomainKey::Domain(domain) => {
            let domain = domain.clone();
            run_query(store, ctx, move |s| {
                // The store match is a suffix scan; keep only this exact domain.
                let commits = s.commits_matching_author_domain(&domain)?;
                Ok(commits
                    .into_iter()
                    .filter(|c| email_domain(&c.author.email) == Some(domain.as_str()))
                    .collect())
            })
            .await
        }
        DomainKey::Unknown => {
            run_query(store, ctx, move |s| {
                let mut commits = Vec::new();
                for email in &emails {
                    commits.extend(s.author_commits(email)?);
                }
                Ok(commits)
            })
            .await
        }
    }
}

impl fmt::Display for DomainGroupsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut groups: Vec<GroupData> = self
            .group_names()
            .filter_map(|name| self.group_data(name))
            .collect();
        groups.push(self.unknown_group_data());
        groups.sort_by(|a, b| {
            b.num_authors()
                .cmp(&a.num_authors())
                .then_with(|| a.name.cmp(&b.name))
        });

        writeln!(f, "Author domain groups report")?;
        writeln!(f, "Total repository authors: {}", self.total_authors().len())?;
        writeln!(f, "Number of authors by group:")?;
        for group in &groups {
            writeln!(
                f,
                "\t\"{}\":\t{} ({:.2}%)",
                group.name,
                group.num_authors(),
                group.authors_percent
            )?;
        }
        Ok(())
    }
}
