//! Client for a managed content-extraction service (Firecrawl-compatible).
//!
//! `POST {base}/v1/scrape` with a bearer key, asking for markdown and HTML of
//! the main content only. Replies are decoded into a typed envelope; metadata
//! values that are not strings are ignored rather than trusted.
//!
//! Failures are retried with quadratic backoff (`base * attempt²`). Once the
//! policy gives up, the error is reported as
//! [`Error::UpstreamUnavailable`] so the caller can fall back. A 2xx reply
//! with `"success": false` or without any markdown or HTML counts as a
//! failure too.

use super::ScrapedPage;
use crate::config::ManagedConfig;
use crate::error::{Error, FetchError, Result};
use crate::retry::{self, RetryPolicy};
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 2],
    only_main_content: bool,
}

/// The service answers either `{ "success": true, "data": {...} }` or the
/// data object itself.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScrapeEnvelope {
    Wrapped { data: ScrapeData },
    Bare(ScrapeData),
}

#[derive(Debug, Default, Deserialize)]
struct ScrapeData {
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    markdown: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    html: Option<String>,
    #[serde(default)]
    metadata: ScrapeMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ScrapeMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, rename = "og:title", deserialize_with = "lenient_string")]
    og_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    subtitle: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    date: Option<String>,
    #[serde(default, alias = "publishedTime", deserialize_with = "lenient_string")]
    published_time: Option<String>,
    #[serde(
        default,
        rename = "article:published_time",
        deserialize_with = "lenient_string"
    )]
    article_published_time: Option<String>,
    #[serde(default, rename = "pubDate", deserialize_with = "lenient_string")]
    pub_date: Option<String>,
}

/// Accept a string, or the first string of an array; ignore anything else.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let s = match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Array(items)) => items.into_iter().find_map(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        }),
        _ => None,
    };
    Ok(s.filter(|s| !s.trim().is_empty()))
}

/// Decode a 2xx reply body. A reply flagged `"success": false`, or one that
/// carries neither markdown nor HTML, is an upstream failure and is not
/// retried.
fn decode_reply(body: &str) -> Result<ScrapeData> {
    let value: Value = serde_json::from_str(body)?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("service reported failure");
        return Err(Error::UpstreamUnavailable(reason.to_string()));
    }

    let data = match serde_json::from_value::<ScrapeEnvelope>(value)? {
        ScrapeEnvelope::Wrapped { data } | ScrapeEnvelope::Bare(data) => data,
    };
    if data.markdown.is_none() && data.html.is_none() {
        return Err(Error::UpstreamUnavailable("reply has no markdown or html".to_string()));
    }
    Ok(data)
}

impl From<ScrapeData> for ScrapedPage {
    fn from(data: ScrapeData) -> Self {
        let meta = data.metadata;
        ScrapedPage {
            title: data.title.or(meta.title).or(meta.og_title),
            markdown: data.markdown,
            html: data.html,
            text: None,
            date: meta
                .date
                .or(meta.published_time)
                .or(meta.article_published_time)
                .or(meta.pub_date),
            subtitle: meta.subtitle,
            description: meta.description,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagedClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl ManagedClient {
    /// Fails with [`Error::Config`] when the base URL or key is missing.
    pub fn new(config: &ManagedConfig) -> Result<Self> {
        let base = config.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(Error::Config("managed extraction base URL is not set".to_string()));
        }
        if config.api_key.trim().is_empty() {
            return Err(Error::Config("managed extraction API key is not set".to_string()));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{base}/v1/scrape"),
            api_key: config.api_key.trim().to_string(),
            timeout: config.timeout(),
            policy: config.retry_policy(),
        })
    }

    /// Scrape `url` through the service.
    #[instrument(level = "info", skip(self))]
    pub async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        retry::run(&self.policy, &self.endpoint, |attempt| self.attempt(url, attempt))
            .await
            .map_err(|e| match e {
                Error::UpstreamUnavailable(_) => e,
                other => Error::UpstreamUnavailable(other.to_string()),
            })
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Result<ScrapedPage> {
        let request = ScrapeRequest {
            url,
            formats: ["markdown", "html"],
            only_main_content: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_fetch(FetchError::HttpStatus {
                url: self.endpoint.clone(),
                status,
                body: truncate_for_log(&body, 300),
            }));
        }

        let body = response.text().await.map_err(|e| self.network_error(e))?;
        let data = decode_reply(&body).inspect_err(|e| {
            warn!(error = %e, body = %truncate_for_log(&body, 300), "Unusable scrape reply");
        })?;

        debug!(
            attempt,
            has_markdown = data.markdown.is_some(),
            has_html = data.html.is_some(),
            "Managed scrape succeeded"
        );
        Ok(data.into())
    }

    fn network_error(&self, e: reqwest::Error) -> Error {
        let err = if e.is_timeout() {
            FetchError::Timeout {
                url: self.endpoint.clone(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Network {
                url: self.endpoint.clone(),
                source: e,
            }
        };
        Error::from_fetch(err)
    }
}
