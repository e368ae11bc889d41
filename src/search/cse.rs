//! Google Custom Search JSON API backend.
//!
//! Pages are requested as `GET /customsearch/v1?key&cx&q&num=10&start=N`,
//! where `start` is one-based. The API never serves results past the 100th,
//! so larger limits are clamped.

use super::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, RetryFetch};
use super::{PageFetch, SearchBackend, paged_results};
use crate::error::MinerError;
use futures::stream::LocalBoxStream;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_CSE_BASE_URL: &str = "https://www.googleapis.com";
const PAGE_SIZE: usize = 10;
const RESULT_CEILING: usize = 100;

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    #[serde(default)]
    link: String,
}

/// One-page client for the Custom Search API.
#[derive(Debug, Clone)]
pub struct CseClient {
    client: Client,
    base_url: String,
    api_key: String,
    engine_id: String,
}

impl CseClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
    ) -> Result<Self, MinerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MinerError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
        })
    }
}

impl PageFetch for CseClient {
    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    #[instrument(level = "info", skip_all, fields(offset = offset))]
    async fn fetch_page(&self, query: &str, offset: usize) -> Result<Vec<String>, MinerError> {
        let start = (offset + 1).to_string();
        let num = PAGE_SIZE.to_string();
        let response = self
            .client
            .get(format!("{}/customsearch/v1", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
                ("start", start.as_str()),
            ])
            .send()
            .await
            .map_err(MinerError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MinerError::from_status(status, &body));
        }

        let data: CseResponse = response
            .json()
            .await
            .map_err(|e| MinerError::retrieval(format!("failed to parse search response: {e}")))?;
        let links: Vec<String> = data
            .items
            .into_iter()
            .map(|item| item.link)
            .filter(|link| !link.is_empty())
            .collect();
        debug!(count = links.len(), "Custom Search page parsed");
        Ok(links)
    }
}

/// [`SearchBackend`] over the Custom Search API, with retries.
#[derive(Debug)]
pub struct GoogleCustomSearch {
    fetcher: RetryFetch<CseClient>,
    max_results: usize,
}

impl GoogleCustomSearch {
    pub fn new(client: CseClient, max_results: usize) -> Self {
        Self::with_retry(client, max_results, DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }

    pub fn with_retry(
        client: CseClient,
        max_results: usize,
        max_retries: usize,
        base_delay: Duration,
    ) -> Self {
        if max_results > RESULT_CEILING {
            info!(
                requested = max_results,
                ceiling = RESULT_CEILING,
                "Custom Search serves at most 100 results; clamping"
            );
        }
        Self {
            fetcher: RetryFetch::new(client, max_retries, base_delay),
            max_results: max_results.min(RESULT_CEILING),
        }
    }
}

impl SearchBackend for GoogleCustomSearch {
    fn name(&self) -> &'static str {
        "google_cse"
    }

    fn search<'a>(&'a self, query: &'a str) -> LocalBoxStream<'a, Result<String, MinerError>> {
        paged_results(&self.fetcher, query, self.max_results, Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn items(range: std::ops::Range<usize>) -> serde_json::Value {
        let items: Vec<_> = range
            .map(|i| json!({ "link": format!("https://www.news{i}.co.za/story"), "title": "t" }))
            .collect();
        json!({ "items": items })
    }

    fn backend(server: &MockServer, max_results: usize) -> GoogleCustomSearch {
        let client = CseClient::new(server.uri(), "key-123", "engine-9").unwrap();
        GoogleCustomSearch::with_retry(client, max_results, 2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_pages_through_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "1"))
            .and(query_param("key", "key-123"))
            .and(query_param("cx", "engine-9"))
            .and(query_param("q", "\"human trafficking\" after:2025-03-03"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items(0..10)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items(10..13)))
            .expect(1)
            .mount(&server)
            .await;

        let search = backend(&server, 200);
        let urls: Vec<String> = search
            .search("\"human trafficking\" after:2025-03-03")
            .try_collect()
            .await
            .unwrap();

        assert_eq!(urls.len(), 13);
        assert_eq!(urls[0], "https://www.news0.co.za/story");
        assert_eq!(urls[12], "https://www.news12.co.za/story");
    }

    #[tokio::test]
    async fn test_missing_items_means_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "customsearch#search" })))
            .expect(1)
            .mount(&server)
            .await;

        let urls: Vec<String> = backend(&server, 50).search("q").try_collect().await.unwrap();
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items(0..3)))
            .mount(&server)
            .await;

        let urls: Vec<String> = backend(&server, 50).search("q").try_collect().await.unwrap();
        assert_eq!(urls.len(), 3);
    }

    #[tokio::test]
    async fn test_forbidden_is_a_retrieval_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quota exceeded"))
            .expect(1)
            .mount(&server)
            .await;

        let result: Result<Vec<String>, _> = backend(&server, 50).search("q").try_collect().await;
        match result {
            Err(MinerError::Retrieval { message, transient }) => {
                assert!(!transient);
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("expected retrieval error, got {other:?}"),
        }
    }

    #[test]
    fn test_max_results_is_clamped() {
        let client = CseClient::new(DEFAULT_CSE_BASE_URL, "k", "cx").unwrap();
        assert_eq!(GoogleCustomSearch::new(client, 200).max_results, RESULT_CEILING);
    }
}
