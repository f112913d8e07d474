//! Analysis settings and domain-group definitions.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;

const CONFIG_DIR_NAME: &str = "commitstats";
const CONFIG_FILE_NAME: &str = "config.json";

/// Tunables for a report run. Every field has a default, so a config file
/// only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Group compared against everyone else
    pub corporate_group: String,
    /// Upper bound on concurrently running store queries
    pub max_parallel_queries: usize,
    pub query_timeout_secs: u64,
    pub git_timeout_secs: u64,
    /// Number of survival timesteps written to the summary row
    pub survival_steps: usize,
    /// Impact scores above this value are treated as data anomalies
    pub outlier_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            corporate_group: "Corporate".to_string(),
            max_parallel_queries: default_parallelism(),
            query_timeout_secs: 60,
            git_timeout_secs: 600,
            survival_steps: 10,
            outlier_threshold: 5000.0,
        }
    }
}

/// Use 75% of available CPUs to leave room for other system processes.
fn default_parallelism() -> usize {
    (num_cpus::get() * 3 / 4).max(1)
}

impl AnalysisConfig {
    /// Load from `path`, or from the per-user default location when `path` is
    /// `None`. A missing default file yields the defaults; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "loaded analysis config");
        Ok(config.sanitized())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    fn sanitized(mut self) -> Self {
        self.max_parallel_queries = self.max_parallel_queries.max(1);
        self
    }
}

/// Named groups of email domains, each described by regular expressions that
/// are tested against the domain part of an author's email address.
#[derive(Debug, Clone, Default)]
pub struct DomainGroups {
    groups: BTreeMap<String, Vec<Regex>>,
}

impl DomainGroups {
    /// Compile every pattern up front so matching never fails later.
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut compiled = BTreeMap::new();
        for (group, patterns) in groups {
            let regexes = patterns
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                        group: group.clone(),
                        pattern: pattern.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            compiled.insert(group, regexes);
        }
        Ok(Self { groups: compiled })
    }

    /// Parse a JSON object mapping group name to an array of patterns.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let groups: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        Self::new(groups)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let groups = Self::from_json_str(&read_to_string(path)?)?;
        debug!(path = %path.display(), groups = groups.len(), "loaded domain groups");
        Ok(groups)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Whether any of `group`'s patterns matches `domain`. Unknown groups
    /// match nothing.
    pub fn matches(&self, group: &str, domain: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|patterns| patterns.iter().any(|re| re.is_match(domain)))
    }

    /// Every group whose patterns match `domain`, in name order.
    pub fn groups_for_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.groups
            .iter()
            .filter(move |(_, patterns)| patterns.iter().any(|re| re.is_match(domain)))
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Read a JSON array of repository paths, as used for batch runs.
pub fn load_repository_list(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let raw = read_to_string(path)?;
    let repos: Vec<PathBuf> = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), repositories = repos.len(), "loaded repository list");
    Ok(repos)
}

fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
