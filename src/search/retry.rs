//! Exponential backoff for search page requests.
//!
//! [`RetryFetch`] wraps any [`PageFetch`] and retries transient failures
//! (network errors, HTTP 429 and 5xx). Permanent failures such as a rejected
//! API key are returned immediately.
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use super::PageFetch;
use crate::error::MinerError;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Decorator adding retries with exponential backoff to a [`PageFetch`].
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: PageFetch,
{
    /// Wrap `inner` with retries.
    ///
    /// # Arguments
    ///
    /// * `inner` - The page fetcher to call
    /// * `max_retries` - Retries after the first attempt; `0` disables retrying
    /// * `base_delay` - Delay before the first retry, doubled on each later one
    ///   and capped at 30 seconds
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        let delay = self.base_delay.saturating_mul(1 << exp).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> PageFetch for RetryFetch<T>
where
    T: PageFetch,
{
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    #[instrument(level = "debug", skip_all, fields(offset = offset))]
    async fn fetch_page(&self, query: &str, offset: usize) -> Result<Vec<String>, MinerError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.fetch_page(query, offset).await {
                Ok(urls) => return Ok(urls),
                Err(e) => {
                    attempt += 1;
                    let elapsed_ms_attempt = attempt_t0.elapsed().as_millis();
                    let elapsed_ms_total = total_t0.elapsed().as_millis();

                    if !e.is_transient() {
                        error!(attempt, elapsed_ms_total, error = %e, "Page fetch failed permanently");
                        return Err(e);
                    }
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt,
                            elapsed_ms_total,
                            error = %e,
                            "Page fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "Page fetch failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Replays a fixed script of outcomes, one per call.
    struct Scripted {
        outcomes: RefCell<Vec<Result<Vec<String>, MinerError>>>,
        calls: RefCell<usize>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<Vec<String>, MinerError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: RefCell::new(outcomes),
                calls: RefCell::new(0),
            }
        }
    }

    impl PageFetch for Scripted {
        fn page_size(&self) -> usize {
            10
        }

        async fn fetch_page(&self, _query: &str, _offset: usize) -> Result<Vec<String>, MinerError> {
            *self.calls.borrow_mut() += 1;
            self.outcomes
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let inner = Scripted::new(vec![
            Err(MinerError::transient("503")),
            Err(MinerError::transient("connection reset")),
            Ok(vec!["https://a.co.za/1".to_string()]),
        ]);
        let fetch = RetryFetch::new(inner, 3, Duration::from_millis(1));

        let urls = fetch.fetch_page("q", 0).await.unwrap();
        assert_eq!(urls, vec!["https://a.co.za/1".to_string()]);
        assert_eq!(*fetch.inner.calls.borrow(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let inner = Scripted::new(vec![Err(MinerError::retrieval("403 forbidden"))]);
        let fetch = RetryFetch::new(inner, 3, Duration::from_millis(1));

        assert!(fetch.fetch_page("q", 0).await.is_err());
        assert_eq!(*fetch.inner.calls.borrow(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Scripted::new(vec![
            Err(MinerError::transient("1")),
            Err(MinerError::transient("2")),
            Err(MinerError::transient("3")),
        ]);
        let fetch = RetryFetch::new(inner, 2, Duration::from_millis(1));

        let err = fetch.fetch_page("q", 0).await.unwrap_err();
        assert_eq!(err.to_string(), "retrieval error: 3");
        assert_eq!(*fetch.inner.calls.borrow(), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let fetch = RetryFetch::new(Scripted::new(vec![]), 3, Duration::from_secs(1));
        assert!(fetch.backoff(1) >= Duration::from_secs(1));
        assert!(fetch.backoff(1) <= Duration::from_millis(1250));
        assert!(fetch.backoff(40) <= Duration::from_millis(30_250));
    }
}
