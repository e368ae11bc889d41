//! CSV output, one file per run.
//!
//! ```text
//! output_dir/
//! └── saved_urls_<search id>_<YYYYmmdd_HHMMSS>.csv
//! ```
//!
//! The header row is always written, even when a run found nothing.

use super::RecordSink;
use crate::error::MinerError;
use crate::models::NormalizedRecord;
use crate::utils::slugify_id;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

const SINK_NAME: &str = "csv";

/// Writes a run's records to a deterministically named CSV file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// The sink for run `search_id` started at `run_timestamp`.
    ///
    /// # Arguments
    ///
    /// * `output_dir` - Directory the CSV is written into (created on write)
    /// * `search_id` - Run config id; slugged into the file name
    /// * `run_timestamp` - Process start time, formatted `YYYYmmdd_HHMMSS`
    ///
    /// Ids that slug to the same name would share a file; config validation
    /// rejects them before any sink exists.
    pub fn new(output_dir: impl AsRef<Path>, search_id: &str, run_timestamp: NaiveDateTime) -> Self {
        let file_name = format!(
            "saved_urls_{}_{}.csv",
            slugify_id(search_id),
            run_timestamp.format("%Y%m%d_%H%M%S")
        );
        Self {
            path: output_dir.as_ref().join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Render records as CSV with a `url,domain_name,source` header.
pub fn to_csv(records: &[NormalizedRecord]) -> Result<Vec<u8>, MinerError> {
    let failed = |e: ::csv::Error| MinerError::sink(SINK_NAME, e.to_string());

    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["url", "domain_name", "source"])
        .map_err(failed)?;
    for record in records {
        writer
            .write_record([&record.url, &record.domain_name, &record.source])
            .map_err(failed)?;
    }
    writer
        .into_inner()
        .map_err(|e| MinerError::sink(SINK_NAME, e.to_string()))
}

impl RecordSink for CsvSink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn write_records(&self, records: &[NormalizedRecord]) -> Result<usize, MinerError> {
        let bytes = to_csv(records)?;

        if let Some(dir) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(dir).await {
                error!(dir = %dir.display(), error = %e, "Failed to create CSV output dir");
                return Err(MinerError::sink(SINK_NAME, e.to_string()));
            }
        }

        fs::write(&self.path, bytes)
            .await
            .map_err(|e| MinerError::sink(SINK_NAME, format!("{}: {e}", self.path.display())))?;
        info!(rows = records.len(), "CSV file created");
        Ok(records.len())
    }
}
