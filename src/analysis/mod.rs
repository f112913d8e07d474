pub mod coding;
pub mod correlation;
pub mod domain_groups;
pub mod git;
pub mod impact;
pub mod log_parser;
pub mod survival;

#[cfg(test)]
mod tests;

pub use coding::CommitCodingReport;
pub use correlation::{correlate_year_month_counts, GroupCorrelation};
pub use domain_groups::{DomainAccumulator, DomainGroupsReport, DomainKey, GroupData};
pub use git::read_commits;
pub use impact::{
    CommitCategory, CommitImpactClassifier, CommitImpactReport, CommitTaxonomy, ImpactScorer,
};
pub use log_parser::{parse_commit_log, CommitLogParser};
pub use survival::{GroupSurvivalReport, TimeStepPopulation, TimeStepSurvival};
