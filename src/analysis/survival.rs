//! Contributor retention estimated with the Kaplan-Meier product-limit
//! method.
//!
//! An author "survives" a month if they have committed in every month since
//! their first one. The first month without a commit ends their run for good,
//! even if they come back later.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{run_query, CommitStore, QueryContext};
use crate::types::Commit;
use crate::utils::EmailSet;

/// Number of authors still active at each month offset from their first
/// contribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeStepPopulation(pub Vec<usize>);

/// Estimated probability of still being active at each month offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeStepSurvival(pub Vec<f64>);

impl TimeStepPopulation {
    /// Build from each author's run length: `population[i]` counts the runs
    /// longer than `i`.
    pub fn from_run_lengths(runs: &[usize]) -> Self {
        let longest = runs.iter().copied().max().unwrap_or(0);
        Self(
            (0..longest)
                .map(|step| runs.iter().filter(|&&run| run > step).count())
                .collect(),
        )
    }

    /// `S(0) = 1`, then `S(t) = S(t-1) * (1 - d(t) / n(t-1))` where `d(t)` is
    /// how many dropped out at step `t`. Stops early once the previous step's
    /// population is zero.
    pub fn kaplan_meier(&self) -> TimeStepSurvival {
        let population = &self.0;
        if population.is_empty() {
            return TimeStepSurvival::default();
        }

        let mut survival = Vec::with_capacity(population.len());
        survival.push(1.0);

        for step in 1..population.len() {
            let previous = population[step - 1];
            if previous == 0 {
                break;
            }
            let events = previous.saturating_sub(population[step]);
            let last = survival[step - 1];
            survival.push(last * (1.0 - events as f64 / previous as f64));
        }

        TimeStepSurvival(survival)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TimeStepSurvival {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at `step`, or 0 past the end of the curve.
    pub fn at(&self, step: usize) -> f64 {
        self.0.get(step).copied().unwrap_or(0.0)
    }
}

/// Month index on a continuous scale, so consecutive months differ by one.
fn month_index(year: i32, month: u32) -> i64 {
    i64::from(year) * 12 + i64::from(month) - 1
}

/// Length of the run of consecutive months starting at the earliest month.
pub fn unbroken_run_length(active_months: &BTreeSet<i64>) -> usize {
    let Some(&first) = active_months.iter().next() else {
        return 0;
    };
    (0..)
        .take_while(|offset| active_months.contains(&(first + offset)))
        .count()
}

/// Survival curve of a set of authors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSurvivalReport {
    pub authors: EmailSet,
    pub population: TimeStepPopulation,
    pub survival: TimeStepSurvival,
}

impl GroupSurvivalReport {
    /// Build from each author's active months. Authors active in fewer than
    /// two distinct months take no part in the estimate.
    pub fn from_activity(authors: EmailSet, activity: &BTreeMap<String, BTreeSet<i64>>) -> Self {
        let runs: Vec<usize> = authors
            .iter()
            .filter_map(|email| activity.get(email))
            .filter(|months| months.len() >= 2)
            .map(unbroken_run_length)
            .collect();

        let population = TimeStepPopulation::from_run_lengths(&runs);
        let survival = population.kaplan_meier();
        Self {
            authors,
            population,
            survival,
        }
    }

    /// Build from an in-memory corpus; commits by authors outside `authors`
    /// are ignored.
    pub fn from_commits<'a>(authors: EmailSet, commits: impl IntoIterator<Item = &'a Commit>) -> Self {
        let mut activity: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
        for commit in commits {
            if !authors.contains(&commit.author.email) {
                continue;
            }
            if let Some((year, month)) = commit.author_year_month() {
                activity
                    .entry(commit.author.email.clone())
                    .or_default()
                    .insert(month_index(year, month));
            }
        }
        Self::from_activity(authors, &activity)
    }

    /// Fetch every author's commits from the store, at most `max_parallel`
    /// queries at a time, and build the curve.
    pub async fn generate(
        store: &Arc<dyn CommitStore>,
        authors: EmailSet,
        ctx: &QueryContext,
        max_parallel: usize,
    ) -> Result<Self, StoreError> {
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut tasks = JoinSet::new();

        for email in authors.iter() {
            let permit = semaphore.clone().acquire_owned().await?;
            let store = Arc::clone(store);
            let ctx = ctx.clone();
            let email = email.to_string();
            let query_email = email.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let months = run_query(&store, &ctx, move |s: &dyn CommitStore| {
                    Ok(s.author_commits(&query_email)?
                        .iter()
                        .filter_map(Commit::author_year_month)
                        .map(|(year, month)| month_index(year, month))
                        .collect::<BTreeSet<_>>())
                })
                .await?;
                Ok::<_, StoreError>((email, months))
            });
        }

        let mut activity = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (email, months) = joined??;
            activity.insert(email, months);
        }

        let report = Self::from_activity(authors, &activity);
        debug!(
            authors = report.authors.len(),
            steps = report.survival.len(),
            "survival report generated"
        );
        Ok(report)
    }
}
