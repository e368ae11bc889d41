//! Search configuration loading and resolution.
//!
//! The configuration file holds a `run_configs` list. Each entry is resolved
//! into an immutable [`RunPlan`] before any search starts, so that every
//! configuration problem surfaces up front.
//!
//! ```json
//! {
//!   "run_configs": [
//!     { "id": "za_weekly", "days_back": 7, "excluded_domains": ["youtube.com"] }
//!   ]
//! }
//! ```
//!
//! Files ending in `.yaml` or `.yml` are read as YAML; anything else as JSON.

use crate::error::MinerError;
use crate::terms::TermSets;
use crate::utils::slugify_id;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, instrument};

pub const DEFAULT_DAYS_BACK: u32 = 7;
pub const DEFAULT_GEOGRAPHY: &str = "South Africa";
pub const DEFAULT_MAX_RESULTS: usize = 200;

/// Top-level shape of the configuration file.
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub run_configs: Vec<RunConfigEntry>,
}

/// One entry of `run_configs`, as written in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfigEntry {
    pub id: String,
    #[serde(default)]
    pub days_back: Option<u32>,
    #[serde(default)]
    pub excluded_domains: Vec<String>,
    #[serde(default)]
    pub geography: Option<String>,
    #[serde(default)]
    pub include_evidence_terms: Option<bool>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub trafficking_terms: Option<Vec<String>>,
    #[serde(default)]
    pub evidence_terms: Option<Vec<String>>,
    #[serde(default)]
    pub news_context_terms: Option<Vec<String>>,
}

/// Resolved, immutable settings for one search run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub id: String,
    pub days_back: u32,
    /// Lower-cased, deduplicated, in first-seen order.
    pub excluded_domains: Vec<String>,
    pub include_evidence_terms: bool,
    pub max_results: usize,
}

/// Everything a single run needs besides the run context.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub config: SearchConfig,
    pub terms: TermSets,
    pub geography: String,
}

/// Read and validate a configuration file.
///
/// # Arguments
///
/// * `path` - JSON file, or YAML when the extension is `.yaml`/`.yml`
///
/// # Errors
///
/// [`MinerError::Configuration`] when the file is missing, unreadable,
/// malformed, or fails [`ConfigFile::validate`].
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_config(path: &Path) -> Result<ConfigFile, MinerError> {
    if !path.exists() {
        return Err(MinerError::config(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| MinerError::config(format!("cannot read {}: {e}", path.display())))?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let file = if is_yaml {
        parse_yaml(&raw)?
    } else {
        parse_json(&raw)?
    };

    file.validate()?;
    info!(run_configs = file.run_configs.len(), "Loaded search configuration");
    Ok(file)
}

pub fn parse_json(raw: &str) -> Result<ConfigFile, MinerError> {
    serde_json::from_str(raw).map_err(|e| MinerError::config(format!("invalid JSON config: {e}")))
}

pub fn parse_yaml(raw: &str) -> Result<ConfigFile, MinerError> {
    serde_yaml::from_str(raw).map_err(|e| MinerError::config(format!("invalid YAML config: {e}")))
}

impl ConfigFile {
    /// Structural checks that do not depend on the command line.
    ///
    /// Each run writes `saved_urls_<slug>_<timestamp>.csv` with one timestamp
    /// shared by the whole process, so ids must stay distinct after
    /// [`slugify_id`] as well as verbatim.
    ///
    /// # Errors
    ///
    /// [`MinerError::Configuration`] when `run_configs` is empty, an id is
    /// blank, or two ids are equal or slug to the same file name.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.run_configs.is_empty() {
            return Err(MinerError::config("run_configs is empty"));
        }
        let mut by_slug: HashMap<String, &str> = HashMap::new();
        for entry in &self.run_configs {
            let id = entry.id.trim();
            if id.is_empty() {
                return Err(MinerError::config("run config with blank id"));
            }
            let slug = slugify_id(id);
            if let Some(previous) = by_slug.get(&slug) {
                return Err(if *previous == id {
                    MinerError::config(format!("duplicate run config id {id:?}"))
                } else {
                    MinerError::config(format!(
                        "run config ids {previous:?} and {id:?} would share the output file saved_urls_{slug}_*.csv"
                    ))
                });
            }
            by_slug.insert(slug, id);
        }
        Ok(())
    }

    /// Resolve every entry, failing on the first invalid one.
    pub fn plans(&self, cli_days_back: Option<u32>) -> Result<Vec<RunPlan>, MinerError> {
        self.run_configs
            .iter()
            .map(|entry| entry.resolve(cli_days_back))
            .collect()
    }
}

impl RunConfigEntry {
    /// Apply defaults and the command-line override.
    ///
    /// `days_back` precedence: command line, then the entry, then
    /// [`DEFAULT_DAYS_BACK`].
    pub fn resolve(&self, cli_days_back: Option<u32>) -> Result<RunPlan, MinerError> {
        let excluded_domains = self
            .excluded_domains
            .iter()
            .map(|d| normalize_excluded_domain(d))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unique()
            .collect();

        let geography = self
            .geography
            .clone()
            .unwrap_or_else(|| DEFAULT_GEOGRAPHY.to_string());

        let terms = TermSets::default().with_overrides(
            self.trafficking_terms.as_deref(),
            self.evidence_terms.as_deref(),
            self.news_context_terms.as_deref(),
        );

        Ok(RunPlan {
            config: SearchConfig {
                id: self.id.trim().to_string(),
                days_back: cli_days_back.or(self.days_back).unwrap_or(DEFAULT_DAYS_BACK),
                excluded_domains,
                include_evidence_terms: self.include_evidence_terms.unwrap_or(true),
                max_results: self.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            },
            terms,
            geography,
        })
    }
}

/// Lower-case an excluded domain and strip wildcard or dot decoration.
fn normalize_excluded_domain(raw: &str) -> Result<String, MinerError> {
    let domain = raw
        .trim()
        .trim_start_matches("*.")
        .trim_matches('.')
        .to_lowercase();
    if domain.is_empty() {
        return Err(MinerError::config("blank entry in excluded_domains"));
    }
    if domain
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | ':' | '"'))
    {
        return Err(MinerError::config(format!(
            "excluded domain {raw:?} must be a bare domain name"
        )));
    }
    Ok(domain)
}
