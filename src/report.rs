//! Corporate versus community comparison, and its CSV renderings.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analysis::{
    CommitImpactClassifier, CommitImpactReport, CommitTaxonomy, DomainGroupsReport, GroupCorrelation,
    GroupData, GroupSurvivalReport, ImpactScorer,
};
use crate::config::{AnalysisConfig, DomainGroups};
use crate::error::{ConfigError, Error};
use crate::store::{CommitStore, QueryContext};
use crate::utils::YearMonthCount;

/// One named group (the corporate one) compared with every author no named
/// group claims (the community).
#[derive(Debug, Clone)]
pub struct CorporateReport {
    pub domain_groups: DomainGroupsReport,
    pub corporate: GroupData,
    pub community: GroupData,
    /// Monthly correlations, corporate against community
    pub correlation: GroupCorrelation,
    pub corporate_survival: GroupSurvivalReport,
    pub community_survival: GroupSurvivalReport,
    pub corporate_impact: CommitImpactReport,
    pub community_impact: CommitImpactReport,
    survival_steps: usize,
}

impl CorporateReport {
    /// Build the report with the built-in impact classifier.
    pub async fn generate(
        store: &Arc<dyn CommitStore>,
        groups: DomainGroups,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, Error> {
        let scorer = CommitImpactClassifier::new(CommitTaxonomy::builtin(), config.outlier_threshold);
        Self::generate_with_scorer(store, groups, config, cancel, &scorer).await
    }

    pub async fn generate_with_scorer(
        store: &Arc<dyn CommitStore>,
        groups: DomainGroups,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
        scorer: &(dyn ImpactScorer + Sync),
    ) -> Result<Self, Error> {
        if !groups.contains(&config.corporate_group) {
            return Err(ConfigError::MissingGroup(config.corporate_group.clone()).into());
        }

        let mut domain_groups = DomainGroupsReport::new(groups);
        domain_groups.generate(store, config, cancel).await?;

        let corporate = domain_groups
            .group_data(&config.corporate_group)
            .ok_or_else(|| ConfigError::MissingGroup(config.corporate_group.clone()))?;
        let community = domain_groups.unknown_group_data();
        let correlation = corporate.correlation(&community);

        let ctx = QueryContext::new(config.query_timeout(), cancel.clone());
        let corporate_survival = GroupSurvivalReport::generate(
            store,
            corporate.authors.clone(),
            &ctx,
            config.max_parallel_queries,
        )
        .await?;
        let community_survival = GroupSurvivalReport::generate(
            store,
            community.authors.clone(),
            &ctx,
            config.max_parallel_queries,
        )
        .await?;

        let corporate_impact = scorer.score(&corporate.commits);
        let community_impact = scorer.score(&community.commits);

        info!(
            corporate = corporate.num_authors(),
            community = community.num_authors(),
            insertions_correlation = correlation.insertions,
            "corporate report generated"
        );

        Ok(Self {
            domain_groups,
            corporate,
            community,
            correlation,
            corporate_survival,
            community_survival,
            corporate_impact,
            community_impact,
            survival_steps: config.survival_steps,
        })
    }

    /// One summary row for the repository called `name`, optionally preceded
    /// by the header row.
    pub fn summary_rows(&self, name: &str, include_header: bool) -> Vec<Vec<String>> {
        let mut rows = Vec::with_capacity(2);
        if include_header {
            rows.push(self.summary_header());
        }

        let totals = self.domain_groups.total_changes();
        let mut row = vec![
            name.to_string(),
            self.domain_groups.total_commits().len().to_string(),
            self.domain_groups.total_authors().len().to_string(),
            totals.insertions().to_string(),
            totals.deletions().to_string(),
            self.corporate.line_changes.insertions.to_string(),
            self.corporate.line_changes.deletions.to_string(),
            self.corporate.num_authors().to_string(),
            self.community.line_changes.insertions.to_string(),
            self.community.line_changes.deletions.to_string(),
            self.community.num_authors().to_string(),
            self.corporate.insertions_percent.to_string(),
            self.corporate.deletions_percent.to_string(),
            self.corporate.authors_percent.to_string(),
            self.community.insertions_percent.to_string(),
            self.community.deletions_percent.to_string(),
            self.community.authors_percent.to_string(),
            self.correlation.insertions.to_string(),
            self.correlation.deletions.to_string(),
            self.correlation.authors.to_string(),
            self.corporate_impact.mean_impact.to_string(),
            self.community_impact.mean_impact.to_string(),
        ];
        for survival in [&self.corporate_survival, &self.community_survival] {
            row.extend((0..self.survival_steps).map(|step| survival.survival.at(step).to_string()));
        }

        rows.push(row);
        rows
    }

    fn summary_header(&self) -> Vec<String> {
        let mut header: Vec<String> = [
            "name",
            "num_commits",
            "num_authors",
            "num_inserts",
            "num_deletes",
            "corp_inserts",
            "corp_deletes",
            "corp_authors",
            "comm_inserts",
            "comm_deletes",
            "comm_authors",
            "corp_insert_pc",
            "corp_delete_pc",
            "corp_authors_pc",
            "comm_insert_pc",
            "comm_delete_pc",
            "comm_authors_pc",
            "insertions_correl",
            "deletions_correl",
            "authors_correl",
            "mean_corp_impact",
            "mean_comm_impact",
        ]
        .iter()
        .map(|column| column.to_string())
        .collect();

        for prefix in ["corp", "comm"] {
            header.extend((0..self.survival_steps).map(|step| format!("{prefix}_surv_{step}")));
        }
        header
    }

    /// Monthly corporate and community activity, header first. Covers every
    /// month of every year from the first to the last year either group was
    /// active in; empty when neither group has commits.
    pub fn changes_rows(&self) -> Vec<Vec<String>> {
        let (corp_inserts, corp_deletes, corp_authors) = self.corporate.commits.year_month_counts();
        let (comm_inserts, comm_deletes, comm_authors) = self.community.commits.year_month_counts();

        let years: Vec<i32> = self
            .corporate
            .commits
            .year_range()
            .into_iter()
            .chain(self.community.commits.year_range())
            .collect();
        let (Some(&first_year), Some(&last_year)) = (years.iter().min(), years.iter().max()) else {
            return Vec::new();
        };

        let mut rows = vec![[
            "year_month",
            "corp_insertions",
            "corp_deletions",
            "corp_authors",
            "comm_insertions",
            "comm_deletions",
            "comm_authors",
        ]
        .iter()
        .map(|column| column.to_string())
        .collect::<Vec<_>>()];

        let count = |counts: &YearMonthCount, year: i32, month: u32| {
            counts.get(year, month).unwrap_or(0).to_string()
        };

        for year in first_year..=last_year {
            for month in 1..=12 {
                rows.push(vec![
                    format!("{year}-{month}"),
                    count(&corp_inserts, year, month),
                    count(&corp_deletes, year, month),
                    count(&corp_authors, year, month),
                    count(&comm_inserts, year, month),
                    count(&comm_deletes, year, month),
                    count(&comm_authors, year, month),
                ]);
            }
        }
        rows
    }

    /// Population and survival per timestep for both groups, header first.
    pub fn survival_rows(&self) -> Vec<Vec<String>> {
        let corp = &self.corporate_survival;
        let comm = &self.community_survival;
        let steps = corp.population.len().max(comm.population.len());

        let mut rows = vec![vec![
            "timestep".to_string(),
            "corp_population".to_string(),
            "corp_survival".to_string(),
            "comm_population".to_string(),
            "comm_survival".to_string(),
        ]];
        for step in 0..steps {
            rows.push(vec![
                step.to_string(),
                corp.population.0.get(step).copied().unwrap_or(0).to_string(),
                corp.survival.at(step).to_string(),
                comm.population.0.get(step).copied().unwrap_or(0).to_string(),
                comm.survival.at(step).to_string(),
            ]);
        }
        rows
    }
}

/// Render rows as CSV, quoting fields that need it.
pub fn to_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let line: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
