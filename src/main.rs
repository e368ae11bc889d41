//! # Trafficking News Miner
//!
//! Searches the web for recent news about human trafficking and exports the
//! article URLs it finds.
//!
//! ## Features
//!
//! - Builds a boolean search query from term catalogs, a geography and a
//!   trailing date window
//! - Queries Google through the Custom Search JSON API or its result pages
//! - Drops malformed, excluded and duplicate results
//! - Writes one CSV file per run config, and optionally merges the results
//!   into Neo4j
//!
//! ## Usage
//!
//! ```sh
//! GOOGLE_API_KEY=... GOOGLE_CSE_ID=... trafficking_news_miner -c search_config.json
//! ```
//!
//! ## Architecture
//!
//! 1. **Configuration**: load run configs and resolve `days_back`
//! 2. **Query**: build every query up front; any invalid config aborts here
//! 3. **Retrieval**: stream result URLs page by page from the backend
//! 4. **Normalization**: validate, exclude and deduplicate
//! 5. **Output**: write to every sink, isolating sink failures

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod error;
mod models;
mod normalize;
mod query;
mod run;
mod search;
mod sinks;
mod terms;
mod utils;

use cli::Cli;
use error::MinerError;
use run::{RunContext, RunSummary};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    init_tracing(args.log_file.as_deref())?;

    let start_time = std::time::Instant::now();
    info!("trafficking_news_miner starting up");
    debug!(
        config = %args.config.display(),
        output_dir = %args.output_dir.display(),
        backend = ?args.backend,
        days_back = ?args.days_back,
        "Parsed CLI arguments"
    );

    let outcome = mine(&args).await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution time"
    );

    if let Err(e) = outcome {
        error!(error = %e, "trafficking_news_miner finished with errors");
        return Err(e.into());
    }
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

/// Load, validate and execute every run config.
///
/// Configuration problems fail before any search. A failed search is
/// reported after the remaining run configs have executed.
async fn mine(args: &Cli) -> Result<(), MinerError> {
    let backend = args.backend_settings()?;
    let plans = config::load_config(&args.config)?.plans(args.days_back)?;

    let now = Local::now().naive_local();
    let ctx = RunContext {
        today: now.date(),
        run_timestamp: now,
        output_dir: args.output_dir.clone(),
        neo4j: args.neo4j_settings(),
    };
    let runs = run::prepare(&ctx, plans)?;
    info!(
        runs = runs.len(),
        today = %ctx.today,
        graph_sink = ctx.neo4j.is_some(),
        "Search configurations loaded"
    );

    ensure_writable_dir(&ctx.output_dir).await?;

    let summaries = run::run_all(&ctx, &runs, &backend).await?;

    let records: usize = summaries.iter().map(|s| s.records.len()).sum();
    let sink_failures: usize = summaries.iter().map(RunSummary::failed_sinks).sum();
    info!(runs = summaries.len(), records, sink_failures, "All searches finished");

    let failed: Vec<&str> = summaries
        .iter()
        .filter(|s| s.retrieval_error.is_some())
        .map(|s| s.id.as_str())
        .collect();
    if !failed.is_empty() {
        return Err(MinerError::retrieval(format!(
            "search failed for run config(s): {}",
            failed.join(", ")
        )));
    }
    Ok(())
}
