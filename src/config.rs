//! Runtime configuration.
//!
//! A single [`Config`] is loaded once at startup (from an optional YAML file,
//! then overridden by CLI flags and environment variables) and passed by
//! reference into every component constructor.
//!
//! ```yaml
//! concurrency: 3
//! fetch:
//!   timeout_ms: 12000
//!   max_attempts: 3
//! managed:
//!   base_url: https://api.firecrawl.dev
//!   api_key: fc-...
//! batch:
//!   max_articles: 10
//!   max_chars: 10000
//! sources: [TechCrunch]
//! ```

use crate::error::{Error, Result};
use crate::models::Publication;
use crate::retry::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum scrapes in flight during one pipeline run.
    pub concurrency: usize,
    pub fetch: FetchConfig,
    pub discovery: DiscoveryConfig,
    /// Managed extraction service. `None` means direct scraping only.
    pub managed: Option<ManagedConfig>,
    pub llm: LlmConfig,
    pub batch: BatchLimits,
    pub sources: Vec<Publication>,
    /// Per-source archive root overrides, keyed by publication.
    pub archive_roots: HashMap<Publication, String>,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 3,
            fetch: FetchConfig::default(),
            discovery: DiscoveryConfig::default(),
            managed: None,
            llm: LlmConfig::default(),
            batch: BatchLimits::default(),
            sources: vec![Publication::TechCrunch],
            archive_roots: HashMap::new(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load from a YAML file, or fall back to defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        config.check()
    }

    fn check(self) -> Result<Self> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.batch.max_articles == 0 {
            return Err(Error::Config("batch.max_articles must be at least 1".to_string()));
        }
        if self.sources.is_empty() {
            return Err(Error::Config("at least one source must be configured".to_string()));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_jitter_ms: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 12_000,
            max_attempts: 3,
            backoff_base_ms: 600,
            backoff_jitter_ms: 200,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Linear {
                base: Duration::from_millis(self.backoff_base_ms),
                jitter: Duration::from_millis(self.backoff_jitter_ms),
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Archive pages visited per month before moving on.
    pub max_pages: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { max_pages: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "ManagedConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "ManagedConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "ManagedConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl ManagedConfig {
    fn default_timeout_ms() -> u64 {
        15_000
    }

    fn default_max_attempts() -> u32 {
        4
    }

    fn default_backoff_base_ms() -> u64 {
        500
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_ms: Self::default_timeout_ms(),
            max_attempts: Self::default_max_attempts(),
            backoff_base_ms: Self::default_backoff_base_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Quadratic {
                base: Duration::from_millis(self.backoff_base_ms),
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4.1-mini".to_string(),
            max_retries: 5,
            backoff_base_ms: 1_000,
            timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries + 1,
            Backoff::Exponential {
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_secs(30),
                jitter: Duration::from_millis(250),
            },
        )
    }
}

/// Caps on one summarizer batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    pub max_articles: usize,
    /// Budget on the summed text length of a batch, in characters.
    pub max_chars: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_articles: 10,
            max_chars: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}
