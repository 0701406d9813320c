//! Turning one article URL into one validated [`RawArticle`].
//!
//! Scraping follows a two-path pattern:
//!
//! 1. **Managed**: ask the managed extraction service ([`managed`]) for
//!    markdown and HTML of the page's main content.
//! 2. **Direct**: if the service is not configured or gives up, fetch the page
//!    ourselves and run the text extractor ([`direct`]).
//!
//! Whichever path wins produces a [`ScrapedPage`]; [`select_article`] then
//! picks the text and metadata and validates the final record.
//!
//! # Text priority
//!
//! | Order | Candidate |
//! |-------|-----------|
//! | 1 | trimmed markdown |
//! | 2 | extracted paragraph text (direct path) or HTML stripped to text |
//! | 3 | page description |
//! | 4 | page title |

pub mod direct;
pub mod managed;

use crate::config::{Config, ManagedConfig};
use crate::error::{Error, Result};
use crate::extract::strip_html_to_text;
use crate::fetcher::Fetcher;
use crate::models::{Publication, RawArticle};
use crate::utils::as_iso;
use managed::ManagedClient;
use std::future::Future;
use tracing::{debug, instrument, warn};

/// Raw material for one article, from either scraping path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedPage {
    pub title: Option<String>,
    pub markdown: Option<String>,
    pub html: Option<String>,
    /// Readable text already extracted from the HTML.
    pub text: Option<String>,
    /// Unnormalized publish date.
    pub date: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
}

/// Something that can turn an article URL into a [`RawArticle`].
pub trait ArticleScraper {
    /// `publication` is the source whose index listed `url`.
    fn scrape_one(&self, url: &str, publication: Publication) -> impl Future<Output = Result<RawArticle>> + Send;
}

/// Managed-first scraper with direct-fetch fallback.
#[derive(Debug, Clone)]
pub struct SourceScraper {
    managed: Option<ManagedClient>,
    fetcher: Fetcher,
}

impl SourceScraper {
    /// Build from config. Missing managed credentials are an error here; use
    /// [`SourceScraper::direct_only`] to run without the service.
    pub fn new(config: &Config, fetcher: Fetcher) -> Result<Self> {
        let managed: &ManagedConfig = config.managed.as_ref().ok_or_else(|| {
            Error::Config("managed extraction base URL and API key are required".to_string())
        })?;
        Ok(Self {
            managed: Some(ManagedClient::new(managed)?),
            fetcher: direct::fallback_fetcher(fetcher),
        })
    }

    /// [`SourceScraper::new`], or [`SourceScraper::direct_only`] when `direct_only` is set.
    pub fn from_config(config: &Config, fetcher: Fetcher, direct_only: bool) -> Result<Self> {
        if direct_only {
            Ok(Self::direct_only(fetcher))
        } else {
            Self::new(config, fetcher)
        }
    }

    pub fn direct_only(fetcher: Fetcher) -> Self {
        Self {
            managed: None,
            fetcher: direct::fallback_fetcher(fetcher),
        }
    }

    async fn scrape_page(&self, url: &str) -> Result<ScrapedPage> {
        if let Some(managed) = &self.managed {
            match managed.scrape(url).await {
                Ok(page) => return Ok(page),
                Err(e) => warn!(%url, error = %e, "Managed scrape failed; falling back to direct fetch"),
            }
        }
        direct::scrape(&self.fetcher, url).await
    }
}

impl ArticleScraper for SourceScraper {
    #[instrument(level = "info", skip(self), fields(%url, %publication))]
    async fn scrape_one(&self, url: &str, publication: Publication) -> Result<RawArticle> {
        let page = self.scrape_page(url).await?;
        let article = select_article(url, publication, page)?;
        debug!(text_len = article.text.len(), has_date = article.date.is_some(), "Scraped article");
        Ok(article)
    }
}

/// Choose text and metadata from `page` and validate the resulting record.
pub fn select_article(url: &str, publication: Publication, page: ScrapedPage) -> Result<RawArticle> {
    let text = non_empty(page.markdown.as_deref())
        .or_else(|| non_empty(page.text.as_deref()))
        .or_else(|| {
            page.html
                .as_deref()
                .map(strip_html_to_text)
                .filter(|t| !t.is_empty())
        })
        .or_else(|| non_empty(page.description.as_deref()))
        .or_else(|| non_empty(page.title.as_deref()))
        .ok_or_else(|| Error::Scrape {
            url: url.to_string(),
            reason: "no markdown, text, description or title".to_string(),
        })?;

    let article = RawArticle {
        url: url.to_string(),
        publication,
        title: non_empty(page.title.as_deref()).unwrap_or_else(|| "Untitled".to_string()),
        subtitle: non_empty(page.subtitle.as_deref()).or_else(|| non_empty(page.description.as_deref())),
        date: page.date.as_deref().and_then(as_iso),
        text,
    };
    Ok(article.validate()?)
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
