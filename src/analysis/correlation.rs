//! Pearson correlation of monthly activity between two groups.

use statrs::statistics::Statistics;

use super::domain_groups::GroupData;
use crate::utils::YearMonthCount;

/// Correlation of the three monthly metrics compared between two groups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupCorrelation {
    pub insertions: f64,
    pub deletions: f64,
    pub authors: f64,
}

impl GroupData {
    /// Correlate this group's monthly insertions, deletions and distinct
    /// author counts with `other`'s. Each metric is independent; any of them
    /// may be NaN.
    pub fn correlation(&self, other: &GroupData) -> GroupCorrelation {
        let (insertions, deletions, authors) = self.commits.year_month_counts();
        let (other_insertions, other_deletions, other_authors) = other.commits.year_month_counts();

        GroupCorrelation {
            insertions: correlate_year_month_counts(&insertions, &other_insertions),
            deletions: correlate_year_month_counts(&deletions, &other_deletions),
            authors: correlate_year_month_counts(&authors, &other_authors),
        }
    }
}

/// Align two monthly series onto a common grid.
///
/// The grid spans the first through the last year present in both series.
/// Inside the first common year it starts at whichever series starts later,
/// inside the last common year it stops at whichever ends earlier; every year
/// between covers all twelve months, even one that either series skips.
/// Months a series has no entry for count as zero.
pub fn equalise_year_months(a: &YearMonthCount, b: &YearMonthCount) -> (Vec<f64>, Vec<f64>) {
    let common_years: Vec<i32> = a.years().filter(|year| b.contains_year(*year)).collect();
    let (Some(&first_year), Some(&last_year)) = (common_years.first(), common_years.last()) else {
        return (Vec::new(), Vec::new());
    };

    let first_month = |counts: &YearMonthCount, year: i32| {
        counts
            .months(year)
            .and_then(|months| months.keys().next().copied())
            .unwrap_or(1)
    };
    let last_month = |counts: &YearMonthCount, year: i32| {
        counts
            .months(year)
            .and_then(|months| months.keys().next_back().copied())
            .unwrap_or(12)
    };

    let mut xs = Vec::new();
    let mut ys = Vec::new();

    for year in first_year..=last_year {
        let start = if year == first_year {
            first_month(a, year).max(first_month(b, year))
        } else {
            1
        };
        let end = if year == last_year {
            last_month(a, year).min(last_month(b, year))
        } else {
            12
        };

        for month in start..=end {
            xs.push(a.get(year, month).unwrap_or(0) as f64);
            ys.push(b.get(year, month).unwrap_or(0) as f64);
        }
    }

    (xs, ys)
}

/// Pearson correlation coefficient of two equally long samples.
///
/// NaN when the lengths differ, there are fewer than two points, or either
/// sample has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.len() < 2 {
        return f64::NAN;
    }

    let x_std = xs.iter().std_dev();
    let y_std = ys.iter().std_dev();
    if x_std == 0.0 || y_std == 0.0 {
        return f64::NAN;
    }

    xs.iter().covariance(ys.iter()) / (x_std * y_std)
}

pub fn correlate_year_month_counts(a: &YearMonthCount, b: &YearMonthCount) -> f64 {
    let (xs, ys) = equalise_year_months(a, b);
    pearson(&xs, &ys)
}
