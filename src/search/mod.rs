//! Search backends that turn a query string into a lazy stream of URLs.
//!
//! | Backend | Module | Method |
//! |---------|--------|--------|
//! | Google Custom Search | [`cse`] | JSON API, needs an API key and engine id |
//! | Google result pages | [`html`] | HTML scraping of `/search` |
//!
//! Both page through results on demand: a page is only requested when the
//! consumer has used up the previous one. Retries live here, in
//! [`retry::RetryFetch`]; callers never retry.

pub mod cse;
pub mod html;
pub mod retry;

use crate::error::MinerError;
use futures::stream::{self, LocalBoxStream, StreamExt, TryStreamExt};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// The retrieval collaborator: one query in, candidate URLs out.
pub trait SearchBackend {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Lazily yield result URLs for `query`.
    ///
    /// The stream ends after the last result or the first error.
    fn search<'a>(&'a self, query: &'a str) -> LocalBoxStream<'a, Result<String, MinerError>>;
}

/// A paged search service.
pub trait PageFetch {
    /// Results requested per page.
    fn page_size(&self) -> usize;

    /// Fetch the page starting at the zero-based result `offset`.
    async fn fetch_page(&self, query: &str, offset: usize) -> Result<Vec<String>, MinerError>;
}

/// How to reach the selected search service. Resolved once at startup;
/// a backend is then built per run config since result limits differ.
#[derive(Debug, Clone)]
pub enum BackendSettings {
    CustomSearch {
        base_url: String,
        api_key: String,
        engine_id: String,
    },
    ResultPages {
        base_url: String,
        lang: String,
        pause: Duration,
    },
}

impl BackendSettings {
    pub fn build(&self, max_results: usize) -> Result<Box<dyn SearchBackend>, MinerError> {
        Ok(match self {
            BackendSettings::CustomSearch {
                base_url,
                api_key,
                engine_id,
            } => {
                let client = cse::CseClient::new(base_url.as_str(), api_key.as_str(), engine_id.as_str())?;
                Box::new(cse::GoogleCustomSearch::new(client, max_results))
            }
            BackendSettings::ResultPages {
                base_url,
                lang,
                pause,
            } => {
                let client = html::HtmlClient::new(base_url, lang.as_str())?;
                Box::new(html::GoogleHtmlSearch::new(client, max_results, *pause))
            }
        })
    }
}

/// Flatten the pages of `fetcher` into a stream of at most `max_results`
/// URLs, sleeping `pause` between page requests.
///
/// Paging stops at the first short page.
pub fn paged_results<'a, F>(
    fetcher: &'a F,
    query: &'a str,
    max_results: usize,
    pause: Duration,
) -> LocalBoxStream<'a, Result<String, MinerError>>
where
    F: PageFetch + 'a,
{
    let page_size = fetcher.page_size().max(1);
    stream::try_unfold(Some(0usize), move |offset| async move {
        let Some(offset) = offset else {
            return Ok(None);
        };
        if offset >= max_results {
            return Ok(None);
        }
        if offset > 0 && !pause.is_zero() {
            sleep(pause).await;
        }

        let urls = fetcher.fetch_page(query, offset).await?;
        debug!(offset, count = urls.len(), "Fetched result page");
        let next = (urls.len() >= page_size).then_some(offset + page_size);
        Ok::<_, MinerError>(Some((urls, next)))
    })
    .map_ok(|urls| stream::iter(urls.into_iter().map(Ok::<String, MinerError>)))
    .try_flatten()
    .take(max_results)
    .boxed_local()
}
