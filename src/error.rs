//! Error types for the scrape-and-normalize pipeline.
//!
//! [`Error`] is the crate-wide error. Its variants follow how far a failure
//! is allowed to travel:
//!
//! | Variant | Raised by | Handling |
//! |---------|-----------|----------|
//! | `TransientNetwork` | fetcher, managed client | retried with backoff, then surfaced |
//! | `PermanentNetwork` | fetcher, managed client | surfaced on the first attempt |
//! | `Extraction` | text extractor | fails the single URL on the fallback path |
//! | `Validation` | model boundary | drops the offending record or batch |
//! | `UpstreamUnavailable` | managed client | triggers direct-fetch fallback |
//! | `Scrape` | source scraper | URL omitted from the run |
//!
//! [`FetchError`] describes one failed attempt and decides whether it is worth
//! retrying.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transient network error: {0}")]
    TransientNetwork(FetchError),

    #[error("permanent network error: {0}")]
    PermanentNetwork(FetchError),

    #[error("could not extract content from {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("managed extraction unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("no usable text for {url}: {reason}")]
    Scrape { url: String, reason: String },

    #[error("text generation failed: {0}")]
    TextGeneration(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Wrap a single-attempt failure in the variant matching its class.
    pub fn from_fetch(err: FetchError) -> Self {
        if err.is_transient() {
            Error::TransientNetwork(err)
        } else {
            Error::PermanentNetwork(err)
        }
    }

    /// Whether a retry loop should try again after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientNetwork(_))
    }
}

/// What went wrong on one HTTP attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}; body: {body}")]
    HttpStatus {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Timeouts, connect failures, connection resets and 429/5xx are transient.
    /// DNS failures and every other status are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::HttpStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::Timeout { .. } => true,
            FetchError::Network { source, .. } => {
                if source.is_timeout() {
                    return true;
                }
                if looks_like_dns_failure(source) {
                    return false;
                }
                source.is_connect() || has_connection_reset(source)
            }
        }
    }
}

fn looks_like_dns_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.to_string().contains("dns error") {
            return true;
        }
        current = e.source();
    }
    false
}

fn has_connection_reset(err: &(dyn std::error::Error + 'static)) -> bool {
    use std::io::ErrorKind;

    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// A record failed the schema check at a trust boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is not an absolute http(s) URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field} is not an ISO-8601 datetime: {value}")]
    InvalidDate { field: &'static str, value: String },

    #[error("unknown source: {0}")]
    UnknownSource(String),
}
