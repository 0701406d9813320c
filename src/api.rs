//! Text-generation API interaction with exponential backoff retry logic.
//!
//! This module talks to an OpenAI-compatible chat completions endpoint.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`AskAsync`]: Core trait defining async model interaction
//! - [`ChatClient`]: `POST {base}/chat/completions` with a fixed system prompt
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//!
//! # Retry Strategy
//!
//! - Maximum 5 retries (6 attempts)
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter of 0-250ms on every delay
//!
//! Only transient failures (timeouts, connection resets, 429/5xx) are retried.

use crate::config::LlmConfig;
use crate::error::{Error, FetchError, Result};
use crate::retry::{self, RetryPolicy};
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Trait for async model interaction.
///
/// Implementors send text to a model and receive a response. This abstraction
/// allows for different backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the model.
    type Response;

    /// Send `text` as the user turn and receive the model's reply.
    fn ask(&self, text: &str) -> impl Future<Output = Result<Self::Response>> + Send;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying client to wrap.
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The client to wrap
    /// * `policy` - Attempt budget and backoff schedule, usually
    ///   [`LlmConfig::retry_policy`]
    ///
    /// # Returns
    ///
    /// A client that retries transient failures of `inner` and passes every
    /// other error straight through.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let client = ChatClient::new(&config.llm)?;
    /// let retry_client = RetryAsk::new(client, config.llm.retry_policy());
    /// ```
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_attempts", &self.policy.max_attempts)
            .field("backoff", &self.policy.backoff)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + Sync,
    T::Response: Send,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response> {
        retry::run(&self.policy, "ask", |_| self.inner.ask(text)).await
    }
}

/// Instructions sent as the system turn of every request.
pub const SYSTEM_PROMPT: &str = "You are a careful information extractor. \
You only return data that conforms to the provided JSON schema. \
Do not include commentary or markdown. \
If a field is missing, set a reasonable empty value (\"\"), but never fabricate facts like author names. \
Parse and normalize: publishedDate to ISO-8601 (UTC if timezone unknown); \
title with leading and trailing whitespace stripped; \
summary as 3 sentences summarizing the article text.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatClient {
    /// Build a client for `{base_url}/chat/completions`.
    ///
    /// # Arguments
    ///
    /// * `config` - Provider base URL, API key, model name and request timeout
    ///
    /// # Returns
    ///
    /// The client, or [`Error::Config`] when no API key is configured or the
    /// HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("text-generation API key is not set".to_string()))?;

        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        })
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

impl AskAsync for ChatClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model, chars = text.len()))]
    async fn ask(&self, text: &str) -> Result<Self::Response> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.2,
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
            warn!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                status = status.as_u16(),
                "API call failed"
            );
            return Err(Error::from_fetch(FetchError::HttpStatus {
                url: self.endpoint.clone(),
                status,
                body: truncate_for_log(&body, 300),
            }));
        }

        let body = response.text().await.map_err(|e| self.network_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| Error::TextGeneration(format!("unreadable completion: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::TextGeneration("completion has no content".to_string()))?;

        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            reply_chars = content.len(),
            "API call succeeded"
        );
        Ok(content)
    }
}
