//! Discovery followed by a bounded-concurrency scrape fan-out.
//!
//! A run discovers article URLs source by source (sequentially), then scrapes
//! them with at most `concurrency` requests in flight. One URL failing never
//! aborts the run: its slot resolves to `None` and is dropped afterwards.
//! Results are tagged with their discovery index and sorted back into
//! discovery order once every scrape has finished.

use crate::config::Config;
use crate::discover::{LinkDiscoverer, SourceProfile};
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::models::{Publication, RawArticle};
use crate::scrapers::{ArticleScraper, SourceScraper};
use chrono::{DateTime, Months, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// How a URL budget is shared across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    Total(usize),
    PerSource(usize),
}

pub struct Pipeline<S = SourceScraper> {
    discoverer: LinkDiscoverer,
    scraper: S,
    profiles: Vec<SourceProfile>,
    default_sources: Vec<Publication>,
    concurrency: usize,
}

impl Pipeline<SourceScraper> {
    /// Build the production pipeline. With `direct_only`, the managed
    /// extraction service is never called.
    pub fn from_config(config: &Config, direct_only: bool) -> Result<Self> {
        let fetcher = Fetcher::new(&config.fetch)?;
        let scraper = SourceScraper::from_config(config, fetcher.clone(), direct_only)?;
        Self::with_scraper(config, fetcher, scraper)
    }
}

impl<S> Pipeline<S>
where
    S: ArticleScraper + Sync,
{
    pub fn with_scraper(config: &Config, fetcher: Fetcher, scraper: S) -> Result<Self> {
        let profiles = Publication::ALL
            .iter()
            .map(|p| SourceProfile::from_config(*p, config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            discoverer: LinkDiscoverer::new(fetcher, &config.discovery),
            scraper,
            profiles,
            default_sources: config.sources.clone(),
            concurrency: config.concurrency.max(1),
        })
    }

    /// Scrape up to `limit` articles in total from the configured sources.
    #[instrument(level = "info", skip(self))]
    pub async fn run(&self, limit: usize, months_back: u32) -> Vec<RawArticle> {
        let sources = self.default_sources.clone();
        self.execute(&sources, Budget::Total(limit), months_back).await
    }

    /// Scrape up to `limit_per_source` articles from each of `sources`.
    #[instrument(level = "info", skip(self))]
    pub async fn run_sources(
        &self,
        sources: &[Publication],
        limit_per_source: usize,
        months_back: u32,
    ) -> Vec<RawArticle> {
        self.execute(sources, Budget::PerSource(limit_per_source), months_back)
            .await
    }

    async fn execute(&self, sources: &[Publication], budget: Budget, months_back: u32) -> Vec<RawArticle> {
        let t0 = Instant::now();
        let targets = self.discover(sources, budget, months_back).await;
        let discovered = targets.len();

        let articles = scrape_all(&self.scraper, targets, self.concurrency).await;
        let articles = drop_stale(articles, &self.single_page_sources(), months_back, Utc::now());

        info!(
            discovered,
            scraped = articles.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );
        articles
    }

    async fn discover(&self, sources: &[Publication], budget: Budget, months_back: u32) -> Vec<(String, Publication)> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut targets: Vec<(String, Publication)> = Vec::new();

        for publication in sources {
            let limit = match budget {
                Budget::Total(total) => total.saturating_sub(targets.len()),
                Budget::PerSource(n) => n,
            };
            if limit == 0 {
                break;
            }
            let Some(profile) = self.profile(*publication) else {
                continue;
            };
            for url in self.discoverer.discover(profile, months_back, limit).await {
                if seen.insert(url.clone()) {
                    targets.push((url, *publication));
                }
            }
        }
        targets
    }

    fn profile(&self, publication: Publication) -> Option<&SourceProfile> {
        self.profiles.iter().find(|p| p.publication == publication)
    }

    fn single_page_sources(&self) -> Vec<Publication> {
        self.profiles
            .iter()
            .filter(|p| !p.has_monthly_archive())
            .map(|p| p.publication)
            .collect()
    }
}

/// Scrape every `(url, publication)` with at most `concurrency` in flight.
///
/// A freed slot is refilled as soon as any scrape finishes, whatever its
/// position. Failed scrapes and records with blank text are dropped; the rest
/// come back in input order.
pub async fn scrape_all<S>(scraper: &S, targets: Vec<(String, Publication)>, concurrency: usize) -> Vec<RawArticle>
where
    S: ArticleScraper + Sync,
{
    let total = targets.len();
    info!(total, concurrency, "Scraping discovered articles");

    let mut results: Vec<(usize, Option<RawArticle>)> = stream::iter(targets.into_iter().enumerate())
        .map(|(index, (url, publication))| async move {
            let result = match scraper.scrape_one(&url, publication).await {
                Ok(article) => Some(article),
                Err(e) => {
                    warn!(index, %url, error = %e, "Scrape failed; skipping article");
                    None
                }
            };
            (index, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    results.sort_unstable_by_key(|(index, _)| *index);

    let articles: Vec<RawArticle> = results
        .into_iter()
        .filter_map(|(_, article)| article)
        .filter(|a| !a.text.trim().is_empty())
        .collect();
    debug!(total, kept = articles.len(), "Scrape fan-out finished");
    articles
}

/// Drop records from `sources` dated before `now - months_back`. Undated
/// records are kept.
fn drop_stale(
    articles: Vec<RawArticle>,
    sources: &[Publication],
    months_back: u32,
    now: DateTime<Utc>,
) -> Vec<RawArticle> {
    let Some(cutoff) = now.checked_sub_months(Months::new(months_back)) else {
        return articles;
    };
    articles
        .into_iter()
        .filter(|a| {
            if !sources.contains(&a.publication) {
                return true;
            }
            match a.date.as_deref().map(DateTime::parse_from_rfc3339) {
                Some(Ok(date)) => date.with_timezone(&Utc) >= cutoff,
                _ => true,
            }
        })
        .collect()
}
