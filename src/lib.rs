//! # Commit Statistics Library
//!
//! `commitstats` mines a repository's commit history into structured records
//! and compares contributor populations. Authors are split into named groups
//! by the domain of their email address (for example a company's employees
//! versus everyone else) and the groups are compared over time.
//!
//! ## Features
//!
//! - Parse `git log` output into commits with line and file change counts
//! - Persist commits in SQLite, keyed by commit hash
//! - Aggregate authors and changes per email domain and per domain group
//! - Correlate monthly activity between two groups
//! - Estimate contributor retention with Kaplan-Meier survival curves
//! - Score commits by message category and churn
//! - Run ingest and report over a list of repositories in one batch
//!
//! ## Example
//!
//! ```no_run
//! use commitstats::{AnalysisConfig, CommitStore, CorporateReport, DomainGroups, SqliteStore};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> commitstats::Result<()> {
//! let store: Arc<dyn CommitStore> = Arc::new(SqliteStore::open("commits.db")?);
//! let groups = DomainGroups::from_json_str(r#"{"Corporate": ["^videolan\\.org$"]}"#)?;
//! let config = AnalysisConfig::default();
//!
//! let report = CorporateReport::generate(&store, groups, &config, &CancellationToken::new()).await?;
//! println!("{}", report.domain_groups);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use config::{AnalysisConfig, DomainGroups};
pub use error::{Error, Result};
pub use report::CorporateReport;
pub use store::{CommitStore, MemoryStore, SqliteStore};
pub use types::{Changes, Commit, LineChanges, Person};
