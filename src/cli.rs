//! Command-line interface definitions.
//!
//! Credentials and connection settings can also come from environment
//! variables.

use crate::error::MinerError;
use crate::search::cse::DEFAULT_CSE_BASE_URL;
use crate::search::html::DEFAULT_HTML_BASE_URL;
use crate::search::BackendSettings;
use crate::sinks::graph::Neo4jSettings;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Which search service to query.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Google Custom Search JSON API (needs an API key and engine id)
    Cse,
    /// Google result pages, scraped
    Html,
}

/// Find recent trafficking news and export the article URLs.
///
/// # Examples
///
/// ```sh
/// # Search the last 7 days for every run config in search_config.json
/// trafficking_news_miner
///
/// # Search only today, and also merge results into Neo4j
/// trafficking_news_miner --days-back 0 --neo4j-url http://localhost:7474
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Number of days to search back; overrides every run config (default 7)
    #[arg(long = "days-back", alias = "days_back")]
    pub days_back: Option<u32>,

    /// Path to the search configuration (JSON, or YAML by extension)
    #[arg(short, long, default_value = "search_config.json")]
    pub config: PathBuf,

    /// Directory for the CSV output files
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Search service to query
    #[arg(long, value_enum, default_value_t = BackendKind::Cse)]
    pub backend: BackendKind,

    /// Override the search service base URL
    #[arg(long)]
    pub search_base_url: Option<String>,

    /// Google API key for the Custom Search backend
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Programmable Search Engine id for the Custom Search backend
    #[arg(long, env = "GOOGLE_CSE_ID")]
    pub google_cse_id: Option<String>,

    /// Seconds to wait between result pages (HTML backend)
    #[arg(long, default_value_t = 2)]
    pub page_pause_secs: u64,

    /// Neo4j HTTP URL; enables the graph sink when set
    #[arg(long, env = "NEO4J_URL")]
    pub neo4j_url: Option<String>,

    /// Neo4j user name
    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    pub neo4j_user: String,

    /// Neo4j password
    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    pub neo4j_password: Option<String>,

    /// Neo4j database name
    #[arg(long, env = "NEO4J_DATABASE", default_value = "neo4j")]
    pub neo4j_database: String,

    /// Append logs to this file instead of stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Resolve the selected backend, failing when its credentials are missing.
    pub fn backend_settings(&self) -> Result<BackendSettings, MinerError> {
        match self.backend {
            BackendKind::Cse => Ok(BackendSettings::CustomSearch {
                base_url: self.base_url_or(DEFAULT_CSE_BASE_URL),
                api_key: required(&self.google_api_key, "GOOGLE_API_KEY")?,
                engine_id: required(&self.google_cse_id, "GOOGLE_CSE_ID")?,
            }),
            BackendKind::Html => Ok(BackendSettings::ResultPages {
                base_url: self.base_url_or(DEFAULT_HTML_BASE_URL),
                lang: "en".to_string(),
                pause: Duration::from_secs(self.page_pause_secs),
            }),
        }
    }

    /// Graph sink settings, present only when a Neo4j URL was given.
    pub fn neo4j_settings(&self) -> Option<Neo4jSettings> {
        let url = self.neo4j_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(Neo4jSettings {
            url: url.to_string(),
            database: self.neo4j_database.clone(),
            user: self.neo4j_user.clone(),
            password: self.neo4j_password.clone(),
        })
    }

    fn base_url_or(&self, default: &str) -> String {
        self.search_base_url
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String, MinerError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| MinerError::config(format!("{name} is required for the cse backend")))
}
