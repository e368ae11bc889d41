//! Neo4j output through the HTTP transactional endpoint.
//!
//! Records are sent in batches to `POST {url}/db/{database}/tx/commit`.
//! Every statement uses `MERGE`, so re-running a search never duplicates
//! `Url` or `Domain` nodes.

use super::RecordSink;
use crate::error::MinerError;
use crate::models::NormalizedRecord;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument};

const SINK_NAME: &str = "neo4j";
const BATCH_SIZE: usize = 500;

const MERGE_RECORDS: &str = "\
UNWIND $rows AS row
MERGE (url:Url {url: row.url})
  ON CREATE SET url.source = row.source
MERGE (domain:Domain {name: row.domain_name})
MERGE (url)-[:HAS_DOMAIN]->(domain)";

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Connection settings for the graph sink.
#[derive(Debug, Clone)]
pub struct Neo4jSettings {
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

/// Merges `(:Url)-[:HAS_DOMAIN]->(:Domain)` for every record.
#[derive(Debug, Clone)]
pub struct Neo4jSink {
    client: Client,
    endpoint: String,
    user: String,
    password: Option<String>,
}

impl Neo4jSink {
    pub fn new(settings: &Neo4jSettings) -> Result<Self, MinerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MinerError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/db/{}/tx/commit",
                settings.url.trim_end_matches('/'),
                settings.database
            ),
            user: settings.user.clone(),
            password: settings.password.clone(),
        })
    }

    /// Merge a single record.
    pub async fn merge_record(&self, record: &NormalizedRecord) -> Result<(), MinerError> {
        self.commit(std::slice::from_ref(record)).await
    }

    #[instrument(level = "debug", skip_all, fields(rows = rows.len()))]
    async fn commit(&self, rows: &[NormalizedRecord]) -> Result<(), MinerError> {
        let body = json!({
            "statements": [{
                "statement": MERGE_RECORDS,
                "parameters": { "rows": rows },
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, self.password.as_ref())
            .json(&body)
            .send()
            .await
            .map_err(|e| MinerError::sink(SINK_NAME, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MinerError::sink(SINK_NAME, format!("{status}: {text}")));
        }

        let parsed: CommitResponse = response
            .json()
            .await
            .map_err(|e| MinerError::sink(SINK_NAME, format!("unreadable response: {e}")))?;
        if let Some(first) = parsed.errors.first() {
            return Err(MinerError::sink(
                SINK_NAME,
                format!("{}: {}", first.code, first.message),
            ));
        }
        debug!("Neo4j batch committed");
        Ok(())
    }
}

impl RecordSink for Neo4jSink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    #[instrument(level = "info", skip_all, fields(endpoint = %self.endpoint))]
    async fn write_records(&self, records: &[NormalizedRecord]) -> Result<usize, MinerError> {
        let mut written = 0;
        for batch in records.chunks(BATCH_SIZE) {
            self.commit(batch).await.map_err(|e| match e {
                MinerError::SinkWrite { sink, message } => MinerError::SinkWrite {
                    sink,
                    message: format!("{message} (after {written} records)"),
                },
                other => other,
            })?;
            written += batch.len();
        }
        info!(written, "Saved records to Neo4j");
        Ok(written)
    }
}
