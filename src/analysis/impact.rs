//! Heuristic commit impact scoring.
//!
//! Commit messages are classified against a small regex taxonomy. A commit's
//! score is its weighted line churn multiplied by the weight of its category.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::types::Commit;
use crate::utils::CommitMap;

/// Scores above this are treated as data anomalies (vendored or generated
/// files) and left out.
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 5000.0;

const INSERTION_WEIGHT: f64 = 0.9;
const DELETION_WEIGHT: f64 = 0.7;

/// Kind of change a commit message describes.
///
/// Declaration order is also classification precedence: when a message
/// matches several categories the one declared last wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitCategory {
    Feature,
    Bugfix,
    Documentation,
    Testing,
    TestData,
}

impl CommitCategory {
    pub const ALL: [CommitCategory; 5] = [
        CommitCategory::Feature,
        CommitCategory::Bugfix,
        CommitCategory::Documentation,
        CommitCategory::Testing,
        CommitCategory::TestData,
    ];

    pub fn weight(self) -> f64 {
        match self {
            CommitCategory::Feature => 1.0,
            CommitCategory::Bugfix => 0.8,
            CommitCategory::Documentation => 0.6,
            CommitCategory::Testing => 0.3,
            CommitCategory::TestData => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CommitCategory::Feature => "feature",
            CommitCategory::Bugfix => "bugfix",
            CommitCategory::Documentation => "documentation",
            CommitCategory::Testing => "testing",
            CommitCategory::TestData => "testdata",
        }
    }

    /// Lowercase keywords that also match with a capitalised first letter, so
    /// "Fix crash on startup" is a bugfix. "Add ... missing" needs the word
    /// `missing`; a plain "Add X" is not a bugfix.
    fn patterns(self) -> &'static [&'static str] {
        match self {
            CommitCategory::Feature => &[
                r"\b[Ii]ntroduc(e|tion)+\b",
                r"\b[Aa]dd(ed|ition)*\b\s+(\ba\b)*\s*\b(support|new|option|way|function)(s)*\b",
            ],
            CommitCategory::Bugfix => &[
                r"\b[Ff]ix(ed|es)*\b",
                r"\b[Ss]anitise\b",
                r"\b[Bb]roken\b",
                r"\b[Bb]reak(s|ing)+\b",
                r"\b[Rr]evert(s|ing)*\b",
                r"\b[Aa]dd(ed|ition)*\b\s+(\ba\b\s*)?\bmissing\b",
            ],
            CommitCategory::Documentation => {
                &[r"\b[Dd]ocument\b", r"\b[Ee]xplain\b", r"\b[Cc]omment\b"]
            }
            CommitCategory::Testing => &[r"\b[Tt]est(ing)*\b"],
            CommitCategory::TestData => &[r"\b[Tt]est data\b"],
        }
    }
}

impl fmt::Display for CommitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static BUILTIN_TAXONOMY: Lazy<CommitTaxonomy> = Lazy::new(|| CommitTaxonomy {
    categories: CommitCategory::ALL
        .iter()
        .map(|&category| {
            let patterns = category
                .patterns()
                .iter()
                .map(|pattern| Regex::new(pattern).expect("valid taxonomy pattern"))
                .collect();
            (category, patterns)
        })
        .collect(),
});

/// Compiled category patterns, in precedence order.
#[derive(Debug, Clone)]
pub struct CommitTaxonomy {
    categories: Vec<(CommitCategory, Vec<Regex>)>,
}

impl CommitTaxonomy {
    /// The built-in taxonomy. Patterns are compiled once per process.
    pub fn builtin() -> Self {
        BUILTIN_TAXONOMY.clone()
    }

    /// Every category whose patterns match `message`, in precedence order.
    pub fn matching_categories(&self, message: &str) -> Vec<CommitCategory> {
        self.categories
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|re| re.is_match(message)))
            .map(|(category, _)| *category)
            .collect()
    }

    /// The category that decides a message's weight: the last matching one.
    pub fn classify(&self, message: &str) -> Option<CommitCategory> {
        self.matching_categories(message).pop()
    }
}

impl Default for CommitTaxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Impact score per commit id plus their mean.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitImpactReport {
    pub impact: BTreeMap<String, f64>,
    /// NaN when no commit was scored
    pub mean_impact: f64,
}

impl CommitImpactReport {
    pub fn from_scores(impact: BTreeMap<String, f64>) -> Self {
        let mean_impact = if impact.is_empty() {
            f64::NAN
        } else {
            impact.values().sum::<f64>() / impact.len() as f64
        };
        Self {
            impact,
            mean_impact,
        }
    }
}

/// Anything that can assign impact scores to a set of commits.
pub trait ImpactScorer {
    fn score(&self, commits: &CommitMap) -> CommitImpactReport;
}

/// Regex-taxonomy implementation of [`ImpactScorer`].
#[derive(Debug, Clone)]
pub struct CommitImpactClassifier {
    taxonomy: CommitTaxonomy,
    outlier_threshold: f64,
}

impl CommitImpactClassifier {
    pub fn new(taxonomy: CommitTaxonomy, outlier_threshold: f64) -> Self {
        Self {
            taxonomy,
            outlier_threshold,
        }
    }

    pub fn taxonomy(&self) -> &CommitTaxonomy {
        &self.taxonomy
    }

    /// Weighted churn times category weight, before outlier filtering.
    /// `None` when the message matches no category.
    pub fn commit_score(&self, commit: &Commit) -> Option<f64> {
        let category = self.taxonomy.classify(&commit.message())?;
        let changes = commit.line_changes();
        let churn =
            changes.insertions as f64 * INSERTION_WEIGHT + changes.deletions as f64 * DELETION_WEIGHT;
        Some(churn * category.weight())
    }
}

impl Default for CommitImpactClassifier {
    fn default() -> Self {
        Self::new(CommitTaxonomy::builtin(), DEFAULT_OUTLIER_THRESHOLD)
    }
}

impl ImpactScorer for CommitImpactClassifier {
    fn score(&self, commits: &CommitMap) -> CommitImpactReport {
        let mut outliers = 0usize;
        let impact: BTreeMap<String, f64> = commits
            .commits()
            .filter_map(|commit| self.commit_score(commit).map(|score| (commit.id.clone(), score)))
            .filter(|(_, score)| {
                let keep = *score <= self.outlier_threshold;
                if !keep {
                    outliers += 1;
                }
                keep
            })
            .collect();

        debug!(
            commits = commits.len(),
            scored = impact.len(),
            outliers,
            "commit impact scored"
        );
        CommitImpactReport::from_scores(impact)
    }
}
