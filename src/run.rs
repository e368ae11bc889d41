//! Run orchestration: query, collect, normalize, persist.
//!
//! Every run config becomes a [`PreparedRun`] before any search starts, so a
//! bad config fails the process without touching the network. Each prepared
//! run then gets its own backend and sinks and is executed in order.

use crate::config::RunPlan;
use crate::error::MinerError;
use crate::models::{NormalizedRecord, QueryExpression};
use crate::normalize::{collect_stream, NormalizeStats, ResultNormalizer};
use crate::query;
use crate::search::{BackendSettings, SearchBackend};
use crate::sinks::graph::{Neo4jSettings, Neo4jSink};
use crate::sinks::tabular::CsvSink;
use crate::sinks::{write_all, RecordSink, Sink, SinkReport};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Values fixed for the whole process: the clock and where output goes.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub today: NaiveDate,
    pub run_timestamp: NaiveDateTime,
    pub output_dir: PathBuf,
    pub neo4j: Option<Neo4jSettings>,
}

impl RunContext {
    /// The sinks for one run: CSV always, Neo4j when configured.
    pub fn sinks_for(&self, run: &PreparedRun) -> Result<Vec<Sink>, MinerError> {
        let mut sinks = vec![Sink::Tabular(CsvSink::new(
            &self.output_dir,
            &run.plan.config.id,
            self.run_timestamp,
        ))];
        if let Some(settings) = &self.neo4j {
            sinks.push(Sink::Graph(Neo4jSink::new(settings)?));
        }
        Ok(sinks)
    }
}

/// A resolved plan with its query already built.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub plan: RunPlan,
    pub query: QueryExpression,
}

/// What happened during one run.
#[derive(Debug)]
pub struct RunSummary {
    pub id: String,
    pub records: Vec<NormalizedRecord>,
    pub stats: NormalizeStats,
    pub retrieval_error: Option<MinerError>,
    pub sinks: Vec<SinkReport>,
}

impl RunSummary {
    pub fn failed_sinks(&self) -> usize {
        self.sinks.iter().filter(|r| !r.is_ok()).count()
    }
}

/// Build every query up front.
///
/// # Errors
///
/// The first [`MinerError::Configuration`] from [`query::build`], before any
/// search has run.
pub fn prepare(ctx: &RunContext, plans: Vec<RunPlan>) -> Result<Vec<PreparedRun>, MinerError> {
    plans
        .into_iter()
        .map(|plan| {
            let query = query::build(&plan.config, &plan.terms, &plan.geography, ctx.today)?;
            Ok(PreparedRun { plan, query })
        })
        .collect()
}

/// Execute one prepared run against `backend`, writing to every sink.
///
/// A retrieval failure ends collection early, but whatever was accepted
/// before it is still written.
///
/// # Arguments
///
/// * `run` - The resolved config and its query
/// * `backend` - Search backend to stream results from
/// * `sinks` - Every sink the records go to
///
/// # Returns
///
/// A [`RunSummary`] with the records, normalizer stats, the retrieval error
/// (if any) and one report per sink.
#[instrument(level = "info", skip_all, fields(id = %run.plan.config.id, backend = backend.name()))]
pub async fn execute<B, S>(run: &PreparedRun, backend: &B, sinks: &[S]) -> RunSummary
where
    B: SearchBackend + ?Sized,
    S: RecordSink,
{
    let config = &run.plan.config;
    info!(query = %run.query, "Searching for articles");

    let mut normalizer = ResultNormalizer::new(&config.excluded_domains);
    let collected = collect_stream(
        backend.search(run.query.as_str()),
        &mut normalizer,
        Some(config.max_results),
    )
    .await;

    if let Some(e) = &collected.error {
        error!(
            error = %e,
            collected = collected.records.len(),
            "Search failed; writing the results collected so far"
        );
    }

    info!(
        count = collected.records.len(),
        days_back = config.days_back,
        "Retrieved {} articles in the past {} days",
        collected.records.len(),
        config.days_back
    );
    for record in &collected.records {
        info!(url = %record.url, domain = %record.domain_name, "Found article");
    }
    if collected.records.is_empty() {
        warn!("No articles found for this configuration");
    }

    let reports = write_all(&collected.records, sinks).await;

    RunSummary {
        id: config.id.clone(),
        records: collected.records,
        stats: normalizer.stats(),
        retrieval_error: collected.error,
        sinks: reports,
    }
}

/// Execute every prepared run in order, building a backend and sinks for
/// each one.
///
/// Returns an error only when a backend or sink cannot be constructed.
pub async fn run_all(
    ctx: &RunContext,
    runs: &[PreparedRun],
    backend: &BackendSettings,
) -> Result<Vec<RunSummary>, MinerError> {
    let mut summaries = Vec::with_capacity(runs.len());
    for run in runs {
        let search = backend.build(run.plan.config.max_results)?;
        let sinks = ctx.sinks_for(run)?;
        summaries.push(execute(run, search.as_ref(), &sinks).await);
    }
    Ok(summaries)
}
