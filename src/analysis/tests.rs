use super::*;
use crate::config::{AnalysisConfig, DomainGroups};
use crate::error::StoreError;
use crate::store::{CommitStore, MemoryStore, QueryContext};
use crate::types::{Changes, Commit, Person};
use crate::utils::{CommitMap, EmailSet};
use git2::{Repository, Signature, Time};
use pretty_assertions::assert_eq;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// 2021-01-10, 2021-02-10 and 2021-03-10 at 12:00 UTC
const JAN_2021: i64 = 1_610_280_000;
const FEB_2021: i64 = 1_612_958_400;
const MAR_2021: i64 = 1_615_377_600;

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn setup_test_repo() -> (TempDir, Repository) {
    let temp_dir = TempDir::new().unwrap();
    let repo = Repository::init(temp_dir.path().join("sample")).unwrap();
    (temp_dir, repo)
}

fn commit_file(
    repo: &Repository,
    file: &str,
    contents: &str,
    author: (&str, &str, i64),
    message: &str,
) {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(file), contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let (name, email, time) = author;
    let signature = Signature::new(name, email, &Time::new(time, 60)).unwrap();
    let parents: Vec<git2::Commit> = repo
        .head()
        .ok()
        .and_then(|head| head.peel_to_commit().ok())
        .into_iter()
        .collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parent_refs)
        .unwrap();
}

fn groups() -> DomainGroups {
    DomainGroups::from_json_str(r#"{"Corporate": ["^corp\\.com$"], "Academia": ["\\.edu$"]}"#)
        .unwrap()
}

#[tokio::test]
async fn test_repository_to_group_report() {
    if !git_available() {
        eprintln!("git binary not available, skipping");
        return;
    }

    let (_temp_dir, repo) = setup_test_repo();
    commit_file(
        &repo,
        "a.txt",
        "one\ntwo\nthree\n",
        ("Alice", "alice@corp.com", JAN_2021),
        "Introduce the sample file",
    );
    commit_file(
        &repo,
        "a.txt",
        "one\n2\nthree\n",
        ("Bob", "bob@uni.edu", FEB_2021),
        "Fix the second line\n\nIt was spelled out.",
    );
    commit_file(
        &repo,
        "b.txt",
        "extra\n",
        ("Carol", "carol@example.org", MAR_2021),
        "Add another file",
    );

    let commits = read_commits(
        repo.workdir().unwrap(),
        Duration::from_secs(30),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(commits.len(), 3);
    assert_eq!(commits[0].author.email, "alice@corp.com");
    assert_eq!(commits[0].author_time, JAN_2021);
    assert_eq!(commits[0].changes, Changes::new(3, 0, 1));
    assert_eq!(commits[0].repo_name, "sample");
    assert_eq!(commits[1].subject, "Fix the second line");
    assert_eq!(commits[1].body, "It was spelled out.");
    assert_eq!(commits[1].changes, Changes::new(1, 1, 1));
    assert_eq!(commits[2].author.email, "carol@example.org");

    let store: Arc<dyn CommitStore> = Arc::new(MemoryStore::new());
    store.add_commits(&commits).unwrap();

    let mut report = DomainGroupsReport::new(groups());
    report
        .generate(&store, &AnalysisConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total_authors().len(), 3);
    assert_eq!(report.group_data("Corporate").unwrap().line_changes.insertions, 3);
    assert_eq!(report.group_data("Academia").unwrap().num_authors(), 1);
    let unknown = report.unknown_group_data();
    assert_eq!(unknown.authors.iter().collect::<Vec<_>>(), vec!["carol@example.org"]);

    let impact = CommitImpactClassifier::default().score(report.total_commits());
    assert_eq!(impact.impact.len(), 2);
    let fix_id = &commits[1].id;
    assert!((impact.impact[fix_id] - (0.9 + 0.7) * 0.8).abs() < 1e-9);
}

fn random_email(rng: &mut impl Rng, domains: &[Option<&str>]) -> String {
    let local: String = std::iter::repeat_with(|| char::from(rng.sample(Alphanumeric)))
        .take(8)
        .collect();
    match domains.choose(rng).copied().flatten() {
        Some(domain) => format!("{local}@{domain}"),
        None => local,
    }
}

fn random_corpus(count: usize) -> Vec<Commit> {
    let mut rng = rand::thread_rng();
    let domains = [
        Some("corp.com"),
        Some("uni.edu"),
        Some("example.org"),
        Some("mail.net"),
        None,
    ];
    let authors: Vec<String> = (0..count / 4)
        .map(|_| random_email(&mut rng, &domains))
        .collect();

    (0..count)
        .map(|i| {
            let email = authors.choose(&mut rng).unwrap().clone();
            let time = rng.gen_range(1_500_000_000..1_700_000_000);
            Commit {
                id: format!("{i:040x}"),
                repo_name: "random".to_string(),
                author: Person::new("Random", email.clone()),
                author_time: time,
                committer: Person::new("Random", email),
                committer_time: time,
                changes: Changes::new(rng.gen_range(0..500), rng.gen_range(0..500), 1),
                subject: "Change".to_string(),
                body: String::new(),
            }
        })
        .collect()
}

#[test]
fn test_disjoint_groups_partition_authors() {
    let commits = random_corpus(400);
    let mut report = DomainGroupsReport::new(groups());
    report.generate_from_commits(commits);

    let named: Vec<GroupData> = report
        .group_names()
        .filter_map(|name| report.group_data(name))
        .collect();
    let unknown = report.unknown_group_data();

    let union = named
        .iter()
        .fold(unknown.authors.clone(), |all, group| all.union(&group.authors));
    assert_eq!(&union, report.total_authors());

    let sizes: usize =
        named.iter().map(GroupData::num_authors).sum::<usize>() + unknown.num_authors();
    assert_eq!(sizes, report.total_authors().len());

    let insertions: u64 = named.iter().map(|g| g.line_changes.insertions).sum::<u64>()
        + unknown.line_changes.insertions;
    assert_eq!(insertions, report.total_changes().insertions());

    let commit_count: usize =
        named.iter().map(|g| g.commits.len()).sum::<usize>() + unknown.commits.len();
    assert_eq!(commit_count, report.total_commits().len());
}

#[tokio::test]
async fn test_store_and_memory_aggregation_agree() {
    let commits = random_corpus(200);
    let store: Arc<dyn CommitStore> = Arc::new(MemoryStore::with_commits(commits.clone()));

    let mut from_store = DomainGroupsReport::new(groups());
    from_store
        .generate(&store, &AnalysisConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    let mut in_memory = DomainGroupsReport::new(groups());
    in_memory.generate_from_commits(commits);

    assert_eq!(from_store.totals(), in_memory.totals());
    for name in ["Corporate", "Academia"] {
        assert_eq!(
            from_store.group_data(name).unwrap().authors,
            in_memory.group_data(name).unwrap().authors
        );
    }
}

#[tokio::test]
async fn test_group_survival_and_correlation() {
    let mut commits = Vec::new();
    let month = 31 * 24 * 3600;
    for step in 0..6i64 {
        let time = JAN_2021 + step * month;
        for (email, active) in [
            ("steady@corp.com", true),
            ("early@corp.com", step < 2),
            ("hobby@example.org", step % 2 == 0),
            ("regular@example.org", true),
        ] {
            if !active {
                continue;
            }
            commits.push(Commit {
                id: format!("{email}-{step}"),
                repo_name: "repo".to_string(),
                author: Person::new("Dev", email),
                author_time: time,
                committer: Person::new("Dev", email),
                committer_time: time,
                changes: Changes::new(10 * (step as u64 + 1), 1, 1),
                subject: "Work".to_string(),
                body: String::new(),
            });
        }
    }

    let store: Arc<dyn CommitStore> = Arc::new(MemoryStore::with_commits(commits.clone()));
    let mut report = DomainGroupsReport::new(groups());
    report.generate_from_commits(commits);

    let corporate = report.group_data("Corporate").unwrap();
    let community = report.unknown_group_data();

    let survival = GroupSurvivalReport::generate(
        &store,
        corporate.authors.clone(),
        &QueryContext::default(),
        4,
    )
    .await
    .unwrap();
    assert_eq!(survival.population, TimeStepPopulation(vec![2, 2, 1, 1, 1, 1]));
    assert_eq!(survival.survival.at(0), 1.0);
    assert_eq!(survival.survival.at(2), 0.5);

    let community_survival = GroupSurvivalReport::from_commits(
        community.authors.clone(),
        corporate.commits.commits().chain(community.commits.commits()),
    );
    // hobby@example.org comes back every other month, so its run is one month
    assert_eq!(community_survival.population, TimeStepPopulation(vec![2, 1, 1, 1, 1, 1]));

    let correlation = corporate.correlation(&community);
    let expected = correlation_of(&corporate.commits, &community.commits);
    assert!((correlation.insertions - expected).abs() < 1e-12);
    assert!(correlation.authors.is_finite());
}

fn correlation_of(a: &CommitMap, b: &CommitMap) -> f64 {
    correlate_year_month_counts(&a.year_month_counts().0, &b.year_month_counts().0)
}

#[test]
fn test_email_set_algebra() {
    let a: EmailSet = (0..50).map(|i| format!("a{i}@x.org")).collect();
    let b: EmailSet = (0..30).map(|i| format!("b{i}@y.org")).collect();

    let union = a.union(&b);
    assert_eq!(union.len(), a.len() + b.len());
    assert_eq!(union.difference(&b), a);
}

/// Queries touching `slow.com` take a while, queries touching `fail.com`
/// error out immediately.
struct SlowAndFailingStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowAndFailingStore {
    fn new(delay: Duration) -> Self {
        let commits = ["ann@slow.com", "ben@fail.com"].map(|email| Commit {
            id: email.to_string(),
            author: Person::new("Dev", email),
            author_time: JAN_2021,
            changes: Changes::new(1, 0, 1),
            ..Commit::default()
        });
        Self {
            inner: MemoryStore::with_commits(commits),
            delay,
        }
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if key.ends_with("slow.com") {
            std::thread::sleep(self.delay);
        }
        if key.ends_with("fail.com") {
            return Err(StoreError::Lock);
        }
        Ok(())
    }
}

impl CommitStore for SlowAndFailingStore {
    fn setup(&self) -> Result<(), StoreError> {
        self.inner.setup()
    }

    fn add_commits(&self, commits: &[Commit]) -> Result<(), StoreError> {
        self.inner.add_commits(commits)
    }

    fn commit(&self, id: &str) -> Result<Option<Commit>, StoreError> {
        self.inner.commit(id)
    }

    fn commits(&self) -> Result<Vec<Commit>, StoreError> {
        self.inner.commits()
    }

    fn authors(&self) -> Result<Vec<String>, StoreError> {
        self.inner.authors()
    }

    fn author_commits(&self, email: &str) -> Result<Vec<Commit>, StoreError> {
        self.check(email)?;
        self.inner.author_commits(email)
    }

    fn commits_matching_author_domain(&self, domain: &str) -> Result<Vec<Commit>, StoreError> {
        self.check(domain)?;
        self.inner.commits_matching_author_domain(domain)
    }
}

#[tokio::test]
async fn test_failed_domain_query_does_not_wait_for_the_rest() {
    let delay = Duration::from_secs(2);
    let store: Arc<dyn CommitStore> = Arc::new(SlowAndFailingStore::new(delay));
    let config = AnalysisConfig {
        max_parallel_queries: 4,
        ..AnalysisConfig::default()
    };

    let started = std::time::Instant::now();
    let mut report = DomainGroupsReport::new(groups());
    let result = report
        .generate(&store, &config, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(StoreError::Lock)));
    assert!(started.elapsed() < delay);
    assert!(report.total_authors().is_empty());
}

#[tokio::test]
async fn test_failed_author_query_does_not_wait_for_the_rest() {
    let delay = Duration::from_secs(2);
    let store: Arc<dyn CommitStore> = Arc::new(SlowAndFailingStore::new(delay));
    let authors: EmailSet = ["ann@slow.com", "ben@fail.com"].into_iter().collect();

    let started = std::time::Instant::now();
    let result = GroupSurvivalReport::generate(&store, authors, &QueryContext::default(), 4).await;

    assert!(matches!(result, Err(StoreError::Lock)));
    assert!(started.elapsed() < delay);
}
