//! Google result-page backend.
//!
//! Fetches `/search?q=...&num=10&start=N` and pulls outbound result links out
//! of the HTML. Google wraps results as `/url?q=<target>`; those are
//! unwrapped, and links back into Google itself are dropped.

use super::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, RetryFetch};
use super::{PageFetch, SearchBackend, paged_results};
use crate::error::MinerError;
use futures::stream::LocalBoxStream;
use itertools::Itertools;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_HTML_BASE_URL: &str = "https://www.google.com";
const PAGE_SIZE: usize = 10;
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One-page client for Google's HTML result pages.
#[derive(Debug, Clone)]
pub struct HtmlClient {
    client: Client,
    base_url: Url,
    lang: String,
}

impl HtmlClient {
    pub fn new(base_url: &str, lang: impl Into<String>) -> Result<Self, MinerError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MinerError::config(format!("failed to build HTTP client: {e}")))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| MinerError::config(format!("invalid search base url {base_url:?}: {e}")))?;
        Ok(Self {
            client,
            base_url,
            lang: lang.into(),
        })
    }
}

impl PageFetch for HtmlClient {
    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    #[instrument(level = "info", skip_all, fields(offset = offset))]
    async fn fetch_page(&self, query: &str, offset: usize) -> Result<Vec<String>, MinerError> {
        let search_url = format!(
            "{}/search?q={}&num={}&start={}&hl={}",
            self.base_url.as_str().trim_end_matches('/'),
            urlencoding::encode(query),
            PAGE_SIZE,
            offset,
            urlencoding::encode(&self.lang),
        );

        let response = self
            .client
            .get(&search_url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(MinerError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MinerError::from_status(status, &body));
        }

        let html = response.text().await.map_err(MinerError::from_request)?;
        let links = extract_result_links(&html, &self.base_url)?;
        debug!(count = links.len(), bytes = html.len(), "Result page parsed");
        Ok(links)
    }
}

/// Outbound result links found in a result page, in document order and
/// without repeats.
pub fn extract_result_links(html: &str, base_url: &Url) -> Result<Vec<String>, MinerError> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]")
        .map_err(|e| MinerError::retrieval(format!("invalid selector: {e:?}")))?;

    Ok(document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_result_href(href, base_url))
        .unique()
        .collect())
}

fn resolve_result_href(href: &str, base_url: &Url) -> Option<String> {
    let resolved = base_url.join(href).ok()?;
    let target = if is_search_host(&resolved, base_url) && resolved.path() == "/url" {
        let (_, q) = resolved
            .query_pairs()
            .find(|(k, _)| k == "q" || k == "url")?;
        Url::parse(&q).ok()?
    } else {
        resolved
    };

    if !matches!(target.scheme(), "http" | "https") || is_search_host(&target, base_url) {
        return None;
    }
    Some(target.to_string())
}

fn is_search_host(url: &Url, base_url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return true;
    };
    host == base_url.host_str().unwrap_or_default()
        || host.starts_with("google.")
        || host.contains(".google.")
        || host.ends_with("googleusercontent.com")
        || host.ends_with("gstatic.com")
}

/// [`SearchBackend`] over Google result pages, with retries and a pause
/// between pages.
#[derive(Debug)]
pub struct GoogleHtmlSearch {
    fetcher: RetryFetch<HtmlClient>,
    max_results: usize,
    pause: Duration,
}

impl GoogleHtmlSearch {
    pub fn new(client: HtmlClient, max_results: usize, pause: Duration) -> Self {
        Self {
            fetcher: RetryFetch::new(client, DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY),
            max_results,
            pause,
        }
    }
}

impl SearchBackend for GoogleHtmlSearch {
    fn name(&self) -> &'static str {
        "google_html"
    }

    fn search<'a>(&'a self, query: &'a str) -> LocalBoxStream<'a, Result<String, MinerError>> {
        paged_results(&self.fetcher, query, self.max_results, self.pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <html><body>
          <a href="/search?q=next&amp;start=10">Next</a>
          <div class="g"><a href="/url?q=https://www.news24.com/story-1&amp;sa=U&amp;ved=abc">Story 1</a></div>
          <div class="g"><a href="https://www.iol.co.za/news/story-2">Story 2</a></div>
          <div class="g"><a href="/url?q=https://www.news24.com/story-1&amp;sa=U&amp;ved=def">Story 1 again</a></div>
          <a href="https://maps.google.com/maps?q=x">Maps</a>
          <a href="https://webcache.googleusercontent.com/search?q=cache:x">Cached</a>
          <a href="/url?q=javascript:void(0)">Bad</a>
        </body></html>
    "#;

    fn google() -> Url {
        Url::parse(DEFAULT_HTML_BASE_URL).unwrap()
    }

    #[test]
    fn test_extracts_outbound_links() {
        let links = extract_result_links(PAGE, &google()).unwrap();
        assert_eq!(
            links,
            vec![
                "https://www.news24.com/story-1".to_string(),
                "https://www.iol.co.za/news/story-2".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_page_has_no_links() {
        assert!(extract_result_links("<html></html>", &google()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetches_result_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "\"forced labor\" AND \"Kenya\""))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let client = HtmlClient::new(&server.uri(), "en").unwrap();
        let search = GoogleHtmlSearch::new(client, 50, Duration::ZERO);
        let urls: Vec<String> = search
            .search("\"forced labor\" AND \"Kenya\"")
            .try_collect()
            .await
            .unwrap();

        // A two-link page is short, so paging stops after it.
        assert_eq!(urls.len(), 2);
    }
}
