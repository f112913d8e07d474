//! Which commits talk about which kind of change.

use std::collections::{BTreeMap, BTreeSet};

use super::impact::{CommitCategory, CommitTaxonomy};
use crate::utils::CommitMap;

/// Commit ids per category. A commit appears under every category its
/// message matches, unlike impact scoring where only one category counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitCodingReport {
    pub matches: BTreeMap<CommitCategory, BTreeSet<String>>,
}

impl CommitCodingReport {
    pub fn generate(commits: &CommitMap, taxonomy: &CommitTaxonomy) -> Self {
        let mut matches: BTreeMap<CommitCategory, BTreeSet<String>> = CommitCategory::ALL
            .iter()
            .map(|&category| (category, BTreeSet::new()))
            .collect();

        for commit in commits.commits() {
            for category in taxonomy.matching_categories(&commit.message()) {
                matches.entry(category).or_default().insert(commit.id.clone());
            }
        }

        Self { matches }
    }

    pub fn commits_in(&self, category: CommitCategory) -> impl Iterator<Item = &str> {
        self.matches
            .get(&category)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    pub fn count(&self, category: CommitCategory) -> usize {
        self.matches.get(&category).map_or(0, BTreeSet::len)
    }
}
