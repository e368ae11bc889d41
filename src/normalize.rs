//! Turn raw search result URLs into filtered, deduplicated records.
//!
//! Each raw URL goes through four checks, in order:
//!
//! 1. it must parse as an absolute `http`/`https` URL with a host
//! 2. its registrable domain is looked up in the public suffix list
//! 3. it is dropped if its host or any parent domain is excluded
//! 4. it is dropped if the same URL was already emitted during this run
//!
//! Malformed URLs are logged and skipped; they never abort a run.

use crate::error::MinerError;
use crate::models::NormalizedRecord;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};
use url::{Host, Url};

/// Domain information derived from a URL host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainParts {
    /// The lower-cased host, without a trailing dot.
    pub host: String,
    /// eTLD+1, e.g. `iol.co.za`. The unit of exclusion.
    pub registrable: String,
    /// The label under the public suffix, e.g. `iol`.
    pub name: String,
}

impl DomainParts {
    /// Split a domain host using the ICANN section of the public suffix
    /// list.
    ///
    /// Private-section entries such as `blogspot.com` are not suffixes here,
    /// so `someone.blogspot.com` is named `blogspot`. Hosts under a TLD the
    /// list does not know keep their last label as both registrable domain
    /// and name (`news.example` → `example`).
    pub fn from_domain(domain: &str) -> Self {
        let host = domain.trim_end_matches('.').to_lowercase();
        let suffix_len = icann_suffix_len(&host);

        if suffix_len >= host.len() {
            // The host is itself a public suffix.
            return Self {
                registrable: host.clone(),
                name: host.clone(),
                host,
            };
        }

        let (rest, suffix) = if suffix_len == 0 {
            (host.as_str(), "")
        } else {
            let split = host.len() - suffix_len;
            (host[..split].trim_end_matches('.'), &host[split..])
        };
        let name = rest.rsplit('.').next().unwrap_or(rest).to_string();
        let registrable = if suffix.is_empty() {
            name.clone()
        } else {
            format!("{name}.{suffix}")
        };

        Self {
            host,
            registrable,
            name,
        }
    }

    fn from_ip(ip: String) -> Self {
        Self {
            host: ip.clone(),
            registrable: ip.clone(),
            name: ip,
        }
    }

    /// The host followed by each of its parent domains, ending at the
    /// registrable domain.
    fn candidates(&self) -> impl Iterator<Item = &str> {
        let registrable = self.registrable.as_str();
        std::iter::successors(Some(self.host.as_str()), move |current: &&str| {
            if *current == registrable {
                return None;
            }
            (*current).split_once('.').map(|(_, parent)| parent)
        })
    }
}

/// Byte length of the ICANN public suffix ending `host`, or 0 when the TLD
/// is not listed.
fn icann_suffix_len(host: &str) -> usize {
    let mut candidate = host;
    loop {
        let Some(suffix) = psl::suffix(candidate.as_bytes()) else {
            return 0;
        };
        if !suffix.is_known() {
            return 0;
        }
        let len = suffix.as_bytes().len();
        if suffix.typ() != Some(psl::Type::Private) {
            return len;
        }
        // Private entries sit under an ICANN suffix; retry with its parent.
        match candidate[candidate.len() - len..].split_once('.') {
            Some((_, parent)) => candidate = parent,
            None => return 0,
        }
    }
}

/// Parse a raw result into a URL and its domain parts.
pub fn parse_result(raw: &str) -> Result<(Url, DomainParts), MinerError> {
    let malformed = |reason: String| MinerError::MalformedUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| malformed(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(malformed(format!("unsupported scheme {:?}", url.scheme())));
    }
    let parts = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => DomainParts::from_domain(domain),
        Some(Host::Ipv4(ip)) => DomainParts::from_ip(ip.to_string()),
        Some(Host::Ipv6(ip)) => DomainParts::from_ip(ip.to_string()),
        _ => return Err(malformed("missing host".to_string())),
    };
    Ok((url, parts))
}

/// Counters describing what a normalizer did with its input.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub received: usize,
    pub accepted: usize,
    pub malformed: usize,
    pub excluded: usize,
    pub duplicate: usize,
}

/// Per-run filter state: the exclusion set and the URLs already emitted.
#[derive(Debug)]
pub struct ResultNormalizer {
    excluded: HashSet<String>,
    seen: HashSet<String>,
    stats: NormalizeStats,
}

impl ResultNormalizer {
    pub fn new<I, S>(excluded_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded: excluded_domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_matches('.').to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            seen: HashSet::new(),
            stats: NormalizeStats::default(),
        }
    }

    pub fn stats(&self) -> NormalizeStats {
        self.stats
    }

    /// Run one raw result through the filters.
    ///
    /// Returns the record to emit, or `None` when the result was skipped.
    pub fn accept(&mut self, raw: &str) -> Option<NormalizedRecord> {
        self.stats.received += 1;

        let (mut url, parts) = match parse_result(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, "Skipping malformed search result");
                return None;
            }
        };

        if let Some(matched) = parts.candidates().find(|c| self.excluded.contains(*c)) {
            self.stats.excluded += 1;
            debug!(url = %raw, excluded = %matched, "Skipping excluded domain");
            return None;
        }

        url.set_fragment(None);
        if !self.seen.insert(url.as_str().to_lowercase()) {
            self.stats.duplicate += 1;
            debug!(url = %raw, "Skipping duplicate result");
            return None;
        }

        self.stats.accepted += 1;
        Some(NormalizedRecord::new(raw.trim(), parts.name))
    }
}

/// Normalize an in-memory sequence of raw results.
///
/// Malformed entries are logged and skipped, so this never fails.
pub fn normalize<I, S>(raw_results: I, excluded_domains: &[String]) -> Vec<NormalizedRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalizer = ResultNormalizer::new(excluded_domains);
    raw_results
        .into_iter()
        .filter_map(|raw| normalizer.accept(raw.as_ref()))
        .collect()
}

/// Records gathered from a result stream, and the error that ended it early.
#[derive(Debug)]
pub struct Collected {
    pub records: Vec<NormalizedRecord>,
    pub error: Option<MinerError>,
}

/// Pull results from `raw` one at a time until it ends, fails, or `limit`
/// records have been accepted.
///
/// Nothing beyond the item currently being filtered is requested from the
/// stream, so a slow backend is only asked for what is needed.
///
/// # Arguments
///
/// * `raw` - Result URLs from a search backend
/// * `normalizer` - Per-run filter state; its stats cover everything pulled
/// * `limit` - Stop after this many accepted records (`None` for no limit)
///
/// # Returns
///
/// The accepted records in first-seen order, plus the error that ended the
/// stream early, if any. Records accepted before an error are kept.
#[instrument(level = "info", skip_all, fields(limit = ?limit))]
pub async fn collect_stream<S>(
    mut raw: S,
    normalizer: &mut ResultNormalizer,
    limit: Option<usize>,
) -> Collected
where
    S: Stream<Item = Result<String, MinerError>> + Unpin,
{
    let mut records = Vec::new();
    while limit.is_none_or(|max| records.len() < max) {
        match raw.next().await {
            Some(Ok(url)) => {
                if let Some(record) = normalizer.accept(&url) {
                    records.push(record);
                }
            }
            Some(Err(e)) => {
                return Collected {
                    records,
                    error: Some(e),
                };
            }
            None => break,
        }
    }

    let stats = normalizer.stats();
    info!(
        received = stats.received,
        accepted = stats.accepted,
        malformed = stats.malformed,
        excluded = stats.excluded,
        duplicate = stats.duplicate,
        "Normalized search results"
    );
    Collected {
        records,
        error: None,
    }
}
