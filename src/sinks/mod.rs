//! Record sinks and the adapter that fans records out to them.
//!
//! - [`tabular`]: one CSV file per run (`url,domain_name,source`)
//! - [`graph`]: `Url` and `Domain` nodes merged through Neo4j's HTTP API
//!
//! The set of sinks is fixed when a run is constructed. [`write_all`] tries
//! every sink even when an earlier one fails, and reports each outcome.

pub mod graph;
pub mod tabular;

use crate::error::MinerError;
use crate::models::NormalizedRecord;
use tracing::{error, info, instrument};

/// A destination for normalized records.
pub trait RecordSink {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Persist every record, returning how many were written.
    async fn write_records(&self, records: &[NormalizedRecord]) -> Result<usize, MinerError>;
}

/// The sinks a run can be configured with.
#[derive(Debug)]
pub enum Sink {
    Tabular(tabular::CsvSink),
    Graph(graph::Neo4jSink),
}

impl RecordSink for Sink {
    fn name(&self) -> &'static str {
        match self {
            Sink::Tabular(sink) => sink.name(),
            Sink::Graph(sink) => sink.name(),
        }
    }

    async fn write_records(&self, records: &[NormalizedRecord]) -> Result<usize, MinerError> {
        match self {
            Sink::Tabular(sink) => sink.write_records(records).await,
            Sink::Graph(sink) => sink.write_records(records).await,
        }
    }
}

/// Outcome of writing one run's records to one sink.
#[derive(Debug)]
pub struct SinkReport {
    pub sink: &'static str,
    pub result: Result<usize, MinerError>,
}

impl SinkReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Write `records` to every sink. A failing sink is logged and reported but
/// does not stop the others.
///
/// # Arguments
///
/// * `records` - One run's normalized records
/// * `sinks` - The sinks chosen when the run was constructed, tried in order
///
/// # Returns
///
/// One [`SinkReport`] per sink, in the same order, holding either the number
/// of records written or the sink's error.
#[instrument(level = "info", skip_all, fields(records = records.len(), sinks = sinks.len()))]
pub async fn write_all<S: RecordSink>(records: &[NormalizedRecord], sinks: &[S]) -> Vec<SinkReport> {
    let mut reports = Vec::with_capacity(sinks.len());
    for sink in sinks {
        let result = sink.write_records(records).await;
        match &result {
            Ok(written) => info!(sink = sink.name(), written, "Sink write completed"),
            Err(e) => error!(sink = sink.name(), error = %e, "Sink write failed; continuing with remaining sinks"),
        }
        reports.push(SinkReport {
            sink: sink.name(),
            result,
        });
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Memory {
        rows: RefCell<Vec<NormalizedRecord>>,
    }

    impl RecordSink for Memory {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn write_records(&self, records: &[NormalizedRecord]) -> Result<usize, MinerError> {
            self.rows.borrow_mut().extend_from_slice(records);
            Ok(records.len())
        }
    }

    struct Broken;

    impl RecordSink for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn write_records(&self, _records: &[NormalizedRecord]) -> Result<usize, MinerError> {
            Err(MinerError::sink("broken", "unreachable"))
        }
    }

    enum TestSink {
        Memory(Memory),
        Broken(Broken),
    }

    impl RecordSink for TestSink {
        fn name(&self) -> &'static str {
            match self {
                TestSink::Memory(s) => s.name(),
                TestSink::Broken(s) => s.name(),
            }
        }

        async fn write_records(&self, records: &[NormalizedRecord]) -> Result<usize, MinerError> {
            match self {
                TestSink::Memory(s) => s.write_records(records).await,
                TestSink::Broken(s) => s.write_records(records).await,
            }
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_sinks() {
        let records = vec![
            NormalizedRecord::new("https://a.co.za/1", "a"),
            NormalizedRecord::new("https://b.co.za/2", "b"),
        ];
        let sinks = vec![
            TestSink::Broken(Broken),
            TestSink::Memory(Memory {
                rows: RefCell::new(Vec::new()),
            }),
        ];

        let reports = write_all(&records, &sinks).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].sink, "broken");
        assert!(!reports[0].is_ok());
        assert_eq!(reports[1].sink, "memory");
        assert!(matches!(reports[1].result, Ok(2)));
        match &sinks[1] {
            TestSink::Memory(m) => assert_eq!(*m.rows.borrow(), records),
            TestSink::Broken(_) => unreachable!(),
        }
    }
}
