//! Resilient HTTP GET with per-attempt timeout, retry and linear backoff.
//!
//! Every archive page and direct article fetch goes through [`Fetcher::fetch`].
//! Each attempt carries its own timeout, so cancelling one slow request never
//! touches sibling requests running concurrently on the same client.

use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result};
use crate::retry::{self, RetryPolicy};
use crate::utils::{error_chain, truncate_for_log};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, redirect};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Bytes of an error body kept for diagnostics.
const ERROR_BODY_PREVIEW: usize = 300;

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    timeout: Duration,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::Config(format!("invalid user agent: {e}")))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .default_headers(headers)
            .redirect(redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout: config.timeout(),
            policy: config.retry_policy(),
        })
    }

    /// Override the retry policy (attempt count and backoff).
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET `url`, retrying transient failures.
    ///
    /// Returns the first 2xx response. Non-2xx responses fail with
    /// [`FetchError::HttpStatus`] wrapped as transient (429/5xx) or
    /// permanent (everything else).
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Response> {
        retry::run(&self.policy, url, |attempt| self.attempt(url, attempt)).await
    }

    /// GET `url` and read the body as text.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.fetch(url).await?;
        response
            .text()
            .await
            .map_err(|e| Error::from_fetch(self.classify(url, e)))
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Result<Response> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::from_fetch(self.classify(url, e)))?;

        let status = response.status();
        debug!(
            %url,
            attempt,
            status = status.as_u16(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "fetched"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::from_fetch(FetchError::HttpStatus {
            url: url.to_string(),
            status,
            body: truncate_for_log(&body, ERROR_BODY_PREVIEW),
        }))
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            debug!(%url, error = %error_chain(&e), "request timed out");
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source: e,
            }
        }
    }
}
