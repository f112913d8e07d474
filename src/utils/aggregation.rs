//! Set and counter collections used to aggregate commits.
//!
//! All merge operators return a new value. Inputs are never modified, so a
//! cached total can be reused across report runs without being corrupted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::types::{Commit, LineChanges};

/// Set of author email addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSet(BTreeSet<String>);

impl EmailSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn union(&self, other: &EmailSet) -> EmailSet {
        EmailSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn difference(&self, other: &EmailSet) -> EmailSet {
        EmailSet(self.0.difference(&other.0).cloned().collect())
    }

    pub fn contains(&self, email: &str) -> bool {
        self.0.contains(email)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for EmailSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        EmailSet(iter.into_iter().map(Into::into).collect())
    }
}

/// Line changes bucketed by calendar year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearlyLineChangeMap(BTreeMap<i32, LineChanges>);

impl YearlyLineChangeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-year sum. Years present in either map are kept.
    pub fn merge(&self, other: &YearlyLineChangeMap) -> YearlyLineChangeMap {
        let mut merged = self.0.clone();
        for (year, changes) in &other.0 {
            let entry = merged.entry(*year).or_default();
            *entry = *entry + *changes;
        }
        YearlyLineChangeMap(merged)
    }

    /// Per-year saturating difference. Years only present in `other` are not
    /// introduced.
    pub fn subtract(&self, other: &YearlyLineChangeMap) -> YearlyLineChangeMap {
        YearlyLineChangeMap(
            self.0
                .iter()
                .map(|(year, changes)| {
                    let removed = other.0.get(year).copied().unwrap_or_default();
                    (*year, *changes - removed)
                })
                .collect(),
        )
    }

    pub fn get(&self, year: i32) -> Option<LineChanges> {
        self.0.get(&year).copied()
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, LineChanges)> + '_ {
        self.0.iter().map(|(year, changes)| (*year, *changes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(i32, LineChanges)> for YearlyLineChangeMap {
    /// Entries for the same year are summed.
    fn from_iter<I: IntoIterator<Item = (i32, LineChanges)>>(iter: I) -> Self {
        let mut buckets: BTreeMap<i32, LineChanges> = BTreeMap::new();
        for (year, changes) in iter {
            let entry = buckets.entry(year).or_default();
            *entry = *entry + changes;
        }
        YearlyLineChangeMap(buckets)
    }
}

/// Authors active in each calendar year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearlyEmailMap(BTreeMap<i32, EmailSet>);

impl YearlyEmailMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-year union.
    pub fn merge(&self, other: &YearlyEmailMap) -> YearlyEmailMap {
        let mut merged = self.0.clone();
        for (year, emails) in &other.0 {
            let combined = match merged.get(year) {
                Some(existing) => existing.union(emails),
                None => emails.clone(),
            };
            merged.insert(*year, combined);
        }
        YearlyEmailMap(merged)
    }

    /// Per-year set difference. Years left without authors are dropped and
    /// years only present in `other` are not introduced.
    pub fn subtract(&self, other: &YearlyEmailMap) -> YearlyEmailMap {
        YearlyEmailMap(
            self.0
                .iter()
                .map(|(year, emails)| match other.0.get(year) {
                    Some(removed) => (*year, emails.difference(removed)),
                    None => (*year, emails.clone()),
                })
                .filter(|(_, emails)| !emails.is_empty())
                .collect(),
        )
    }

    pub fn get(&self, year: i32) -> Option<&EmailSet> {
        self.0.get(&year)
    }

    /// Number of authors for each requested year, or for every stored year
    /// in ascending order when `years` is `None`. Missing years count as 0.
    pub fn count_array(&self, years: Option<&[i32]>) -> Vec<usize> {
        match years {
            Some(years) => years
                .iter()
                .map(|year| self.0.get(year).map_or(0, EmailSet::len))
                .collect(),
            None => self.0.values().map(EmailSet::len).collect(),
        }
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(i32, S)> for YearlyEmailMap {
    fn from_iter<I: IntoIterator<Item = (i32, S)>>(iter: I) -> Self {
        let mut buckets: BTreeMap<i32, BTreeSet<String>> = BTreeMap::new();
        for (year, email) in iter {
            buckets.entry(year).or_default().insert(email.into());
        }
        YearlyEmailMap(
            buckets
                .into_iter()
                .map(|(year, emails)| (year, EmailSet(emails)))
                .collect(),
        )
    }
}

/// Monthly counts keyed by year, then by 1-based month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearMonthCount(BTreeMap<i32, BTreeMap<u32, u64>>);

impl YearMonthCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, year: i32, month: u32) -> Option<u64> {
        self.0.get(&year).and_then(|months| months.get(&month)).copied()
    }

    pub fn months(&self, year: i32) -> Option<&BTreeMap<u32, u64>> {
        self.0.get(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.keys().copied()
    }

    pub fn contains_year(&self, year: i32) -> bool {
        self.0.contains_key(&year)
    }

    pub(crate) fn set(&mut self, year: i32, month: u32, value: u64) {
        self.0.entry(year).or_default().insert(month, value);
    }

    /// Values in chronological order, skipping months that are not present.
    pub fn flatten(&self) -> Vec<u64> {
        self.0
            .values()
            .flat_map(|months| months.values().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }
}

impl FromIterator<((i32, u32), u64)> for YearMonthCount {
    /// Entries for the same month are summed.
    fn from_iter<I: IntoIterator<Item = ((i32, u32), u64)>>(iter: I) -> Self {
        let mut counts = YearMonthCount::new();
        for ((year, month), value) in iter {
            let slot = counts.0.entry(year).or_default().entry(month).or_insert(0);
            *slot = slot.saturating_add(value);
        }
        counts
    }
}

/// Commits keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitMap(BTreeMap<String, Arc<Commit>>);

impl CommitMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries from `other` are added, replacing any commit with the same id.
    pub fn union(&self, other: &CommitMap) -> CommitMap {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(id, commit)| (id.clone(), Arc::clone(commit))));
        CommitMap(merged)
    }

    /// Every id present in `other` is removed.
    pub fn difference(&self, other: &CommitMap) -> CommitMap {
        CommitMap(
            self.0
                .iter()
                .filter(|(id, _)| !other.0.contains_key(*id))
                .map(|(id, commit)| (id.clone(), Arc::clone(commit)))
                .collect(),
        )
    }

    pub fn get(&self, id: &str) -> Option<&Commit> {
        self.0.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn commits(&self) -> impl Iterator<Item = &Commit> {
        self.0.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Inserted lines, deleted lines and distinct authors per month of
    /// authorship.
    pub fn year_month_counts(&self) -> (YearMonthCount, YearMonthCount, YearMonthCount) {
        let mut insertions = BTreeMap::<(i32, u32), u64>::new();
        let mut deletions = BTreeMap::<(i32, u32), u64>::new();
        let mut authors = BTreeMap::<(i32, u32), BTreeSet<&str>>::new();

        for commit in self.commits() {
            let Some(bucket) = commit.author_year_month() else {
                continue;
            };
            let changes = commit.line_changes();
            *insertions.entry(bucket).or_insert(0) += changes.insertions;
            *deletions.entry(bucket).or_insert(0) += changes.deletions;
            authors.entry(bucket).or_default().insert(commit.author.email.as_str());
        }

        (
            insertions.into_iter().collect(),
            deletions.into_iter().collect(),
            authors
                .into_iter()
                .map(|(bucket, emails)| (bucket, emails.len() as u64))
                .collect(),
        )
    }

    /// Distinct years of authorship in ascending order.
    pub fn year_range(&self) -> Vec<i32> {
        self.commits()
            .filter_map(Commit::author_year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl FromIterator<Commit> for CommitMap {
    fn from_iter<I: IntoIterator<Item = Commit>>(iter: I) -> Self {
        iter.into_iter().map(Arc::new).collect()
    }
}

impl FromIterator<Arc<Commit>> for CommitMap {
    fn from_iter<I: IntoIterator<Item = Arc<Commit>>>(iter: I) -> Self {
        CommitMap(
            iter.into_iter()
                .map(|commit| (commit.id.clone(), commit))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Changes, Person};
    use pretty_assertions::assert_eq;
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    const SHARED_EMAIL: &str = "developer@claudiocambra.com";

    fn random_token(len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn random_emails(amount: usize) -> Vec<String> {
        (0..amount)
            .map(|i| format!("{}{}@{}.{}", random_token(8), i, random_token(5), random_token(3)))
            .collect()
    }

    fn commit(id: &str, email: &str, author_time: i64, insertions: u64, deletions: u64) -> Commit {
        Commit {
            id: id.to_string(),
            repo_name: "test-repo".to_string(),
            author: Person::new("Test User", email),
            author_time,
            changes: Changes::new(insertions, deletions, 1),
            ..Default::default()
        }
    }

    #[test]
    fn test_disjoint_email_sets() {
        let a: EmailSet = random_emails(10).into_iter().collect();
        let b: EmailSet = random_emails(12).into_iter().collect();

        let union = a.union(&b);
        assert_eq!(union.len(), a.len() + b.len());
        assert_eq!(union.difference(&b), a);
    }

    #[test]
    fn test_email_set_union_counts_shared_author_once() {
        let mut a_emails = random_emails(10);
        let mut b_emails = random_emails(10);
        a_emails.push(SHARED_EMAIL.to_string());
        b_emails.push(SHARED_EMAIL.to_string());

        let a: EmailSet = a_emails.into_iter().collect();
        let b: EmailSet = b_emails.into_iter().collect();

        let union = a.union(&b);
        assert_eq!(union.len(), a.len() + b.len() - 1);
        assert!(union.contains(SHARED_EMAIL));
        // inputs untouched
        assert_eq!(a.len(), 11);
        assert_eq!(b.len(), 11);

        let difference = a.difference(&b);
        assert_eq!(difference.len(), 10);
        assert!(!difference.contains(SHARED_EMAIL));
    }

    #[test]
    fn test_yearly_line_change_merge_and_subtract() {
        let a: YearlyLineChangeMap = vec![
            (2022, LineChanges::new(10, 2)),
            (2023, LineChanges::new(5, 5)),
            (2023, LineChanges::new(1, 0)),
        ]
        .into_iter()
        .collect();
        let b: YearlyLineChangeMap = vec![(2003, LineChanges::new(7, 7)), (2023, LineChanges::new(8, 1))]
            .into_iter()
            .collect();

        let merged = a.merge(&b);
        assert_eq!(merged.get(2003), Some(LineChanges::new(7, 7)));
        assert_eq!(merged.get(2022), Some(LineChanges::new(10, 2)));
        assert_eq!(merged.get(2023), Some(LineChanges::new(14, 6)));

        let subtracted = a.subtract(&b);
        assert_eq!(subtracted.get(2003), None);
        assert_eq!(subtracted.get(2022), Some(LineChanges::new(10, 2)));
        assert_eq!(subtracted.get(2023), Some(LineChanges::new(0, 4)));

        // inputs untouched
        assert_eq!(a.get(2023), Some(LineChanges::new(6, 5)));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_yearly_email_map_merge_and_subtract() {
        let a_emails = random_emails(5);
        let b_emails = random_emails(5);

        let a: YearlyEmailMap = a_emails.iter().map(|e| (2023, e.clone())).collect();
        let b: YearlyEmailMap = b_emails
            .iter()
            .map(|e| (2003, e.clone()))
            .chain(std::iter::once((2023, a_emails[0].clone())))
            .collect();

        let merged = a.merge(&b);
        assert_eq!(merged.count_array(None), vec![5, 5]);
        assert_eq!(merged.count_array(Some(&[2023, 2003, 1999])), vec![5, 5, 0]);

        let subtracted = a.subtract(&b);
        assert!(subtracted.get(2003).is_none(), "subtraction must not add years");
        assert_eq!(subtracted.count_array(Some(&[2023])), vec![4]);

        let emptied = a.subtract(&a);
        assert!(emptied.is_empty());
    }

    #[test]
    fn test_commit_map_union_and_difference() {
        let first = commit("a1", "a@example.com", 0, 1, 1);
        let second = commit("b2", "b@example.com", 0, 2, 2);
        let replacement = commit("a1", "a@example.com", 0, 9, 9);

        let left: CommitMap = vec![first.clone(), second.clone()].into_iter().collect();
        let right: CommitMap = vec![replacement.clone()].into_iter().collect();

        let union = left.union(&right);
        assert_eq!(union.len(), 2);
        assert_eq!(union.get("a1"), Some(&replacement));

        let difference = left.difference(&right);
        assert_eq!(difference.ids().collect::<Vec<_>>(), vec!["b2"]);
        assert_eq!(left.get("a1"), Some(&first));
    }

    #[test]
    fn test_year_month_counts() {
        // 2023-01-15, 2023-01-20, 2023-03-01 (UTC)
        let commits: CommitMap = vec![
            commit("1", "a@example.com", 1_673_740_800, 10, 1),
            commit("2", "a@example.com", 1_674_172_800, 5, 2),
            commit("3", "b@example.com", 1_677_628_800, 3, 3),
        ]
        .into_iter()
        .collect();

        let (insertions, deletions, authors) = commits.year_month_counts();
        assert_eq!(insertions.get(2023, 1), Some(15));
        assert_eq!(insertions.get(2023, 3), Some(3));
        assert_eq!(insertions.get(2023, 2), None);
        assert_eq!(deletions.flatten(), vec![3, 3]);
        assert_eq!(authors.flatten(), vec![1, 1]);
        assert_eq!(commits.year_range(), vec![2023]);
    }
}
