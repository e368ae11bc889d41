//! Error taxonomy for the mining pipeline.
//!
//! Only [`MinerError::Configuration`] is fatal. Retrieval failures end the
//! current run config, while malformed URLs and sink failures are logged and
//! skipped by their callers.

use crate::utils::truncate_for_log;
use thiserror::Error;

/// Every failure the pipeline can report.
#[derive(Debug, Error)]
pub enum MinerError {
    /// Missing or invalid configuration. Raised before any query runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The search backend failed. `transient` marks failures worth retrying
    /// (network errors, HTTP 429 and 5xx).
    #[error("retrieval error: {message}")]
    Retrieval { message: String, transient: bool },

    /// A single raw result could not be turned into a usable URL.
    #[error("malformed url {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// A sink rejected or could not complete a write.
    #[error("{sink} sink write failed: {message}")]
    SinkWrite { sink: &'static str, message: String },
}

impl MinerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// A retrieval failure that retrying will not fix.
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval {
            message: message.into(),
            transient: false,
        }
    }

    /// A retrieval failure that may succeed on a later attempt.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Retrieval {
            message: message.into(),
            transient: true,
        }
    }

    pub fn sink(sink: &'static str, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Retrieval { transient: true, .. })
    }

    /// Classify a `reqwest` transport error from a search backend.
    ///
    /// Only timeouts and connection failures are transient; anything else
    /// (a bad request, an undecodable body) fails the same way on retry.
    pub fn from_request(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::transient(e.to_string())
        } else {
            Self::retrieval(e.to_string())
        }
    }

    /// Classify an unsuccessful HTTP status from a search backend.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!(
            "search service returned {status}: {}",
            truncate_for_log(body.trim(), 300)
        );
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::transient(message)
        } else {
            Self::retrieval(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(MinerError::from_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(MinerError::from_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!MinerError::from_status(StatusCode::FORBIDDEN, "quota").is_transient());
    }

    #[tokio::test]
    async fn test_request_error_classification() {
        let client = reqwest::Client::new();

        let refused = client.get("http://127.0.0.1:1/").send().await.unwrap_err();
        assert!(refused.is_connect());
        assert!(MinerError::from_request(refused).is_transient());

        let invalid = client.get("http://").send().await.unwrap_err();
        assert!(!invalid.is_timeout() && !invalid.is_connect());
        assert!(!MinerError::from_request(invalid).is_transient());
    }

    #[test]
    fn test_only_retrieval_errors_are_transient() {
        assert!(!MinerError::config("x").is_transient());
        assert!(!MinerError::sink("csv", "disk full").is_transient());
        assert!(MinerError::transient("reset").is_transient());
    }

    #[test]
    fn test_display_messages() {
        let e = MinerError::MalformedUrl {
            url: "not a url".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "malformed url \"not a url\": relative URL without a base"
        );
        assert_eq!(
            MinerError::sink("neo4j", "503").to_string(),
            "neo4j sink write failed: 503"
        );
    }
}
