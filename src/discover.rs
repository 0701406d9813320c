//! Article URL discovery across paginated source archives.
//!
//! Each [`Publication`] has a [`SourceProfile`]: where its index pages live
//! and the canonical URL shape of a real article on that site. TechCrunch
//! publishes one paginated archive per month:
//!
//! ```text
//! https://techcrunch.com/2025/05/           page 1
//! https://techcrunch.com/2025/05/page/2/    page 2 ...
//! ```
//!
//! Lenny's Newsletter and TLDR expose a single archive page each.
//!
//! Months and pages are visited strictly in sequence. A month stops paginating
//! when a page adds no new URLs, when its fetch fails, or when the overall
//! limit is reached.

use crate::config::{Config, DiscoveryConfig};
use crate::error::{Error, Result};
use crate::extract::extract_links;
use crate::fetcher::Fetcher;
use crate::models::Publication;
use chrono::{Datelike, Duration, Local, Months, NaiveDate};
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Where a source's index pages live.
#[derive(Debug, Clone)]
pub enum IndexLayout {
    /// `{root}{yyyy}/{mm}/`, then `.../page/{n}/`.
    MonthlyArchive { root: Url },
    /// One archive page listing recent posts.
    SinglePage { url: Url },
}

#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub publication: Publication,
    pub layout: IndexLayout,
    article_pattern: Regex,
}

impl SourceProfile {
    /// The live-site profile for `publication`.
    pub fn for_publication(publication: Publication) -> Self {
        let (layout, pattern) = match publication {
            Publication::TechCrunch => (
                IndexLayout::MonthlyArchive {
                    root: static_url("https://techcrunch.com/"),
                },
                r"(?i)^https?://(www\.)?techcrunch\.com/\d{4}/\d{2}/\d{2}/[^/?#]+/?$",
            ),
            Publication::Lenny => (
                IndexLayout::SinglePage {
                    url: static_url("https://www.lennysnewsletter.com/archive"),
                },
                r"^https://www\.lennysnewsletter\.com/p/",
            ),
            Publication::Tldr => (
                IndexLayout::SinglePage {
                    url: static_url("https://tldr.tech/archives"),
                },
                r"^https://tldr\.tech/(newsletter|ai|webdev|crypto|founders)/\d{4}-\d{2}-\d{2}",
            ),
        };
        Self {
            publication,
            layout,
            article_pattern: Regex::new(pattern).expect("static regex"),
        }
    }

    /// Profile for `publication`, honouring any archive root override in `config`.
    pub fn from_config(publication: Publication, config: &Config) -> Result<Self> {
        let profile = Self::for_publication(publication);
        match config.archive_roots.get(&publication) {
            Some(root) => profile.with_root(root),
            None => Ok(profile),
        }
    }

    /// Point the index pages somewhere else, keeping the article pattern.
    pub fn with_root(mut self, root: &str) -> Result<Self> {
        let url = Url::parse(root)
            .map_err(|e| Error::Config(format!("invalid archive root {root}: {e}")))?;
        self.layout = match self.layout {
            IndexLayout::MonthlyArchive { .. } => IndexLayout::MonthlyArchive { root: url },
            IndexLayout::SinglePage { .. } => IndexLayout::SinglePage { url },
        };
        Ok(self)
    }

    /// Whether `url` has the shape of a real article on this source.
    pub fn is_article(&self, url: &str) -> bool {
        self.article_pattern.is_match(url)
    }

    pub fn has_monthly_archive(&self) -> bool {
        matches!(self.layout, IndexLayout::MonthlyArchive { .. })
    }

    /// First page of each index to visit, newest first.
    fn index_urls(&self, months_back: u32, today: NaiveDate) -> Vec<String> {
        match &self.layout {
            IndexLayout::MonthlyArchive { root } => month_archive_urls(root, months_back, today),
            IndexLayout::SinglePage { url } => vec![url.to_string()],
        }
    }
}

fn static_url(s: &'static str) -> Url {
    Url::parse(s).expect("static URL")
}

/// One archive URL per calendar month, going back from `today`'s month.
///
/// Dates are pinned to the 1st before subtracting so that e.g. March 31st
/// minus one month lands in February rather than overflowing.
pub fn month_archive_urls(root: &Url, months_back: u32, today: NaiveDate) -> Vec<String> {
    let first_of_month = today - Duration::days(i64::from(today.day0()));
    (0..months_back)
        .filter_map(|i| first_of_month.checked_sub_months(Months::new(i)))
        .filter_map(|d| root.join(&format!("{:04}/{:02}/", d.year(), d.month())).ok())
        .map(|u| u.to_string())
        .collect()
}

fn page_url(index_url: &str, page: u32) -> String {
    if page == 1 {
        index_url.to_string()
    } else {
        format!("{}/page/{}/", index_url.trim_end_matches('/'), page)
    }
}

pub struct LinkDiscoverer {
    fetcher: Fetcher,
    max_pages: u32,
}

impl LinkDiscoverer {
    pub fn new(fetcher: Fetcher, config: &DiscoveryConfig) -> Self {
        Self {
            fetcher,
            max_pages: config.max_pages.max(1),
        }
    }

    /// Collect up to `limit` article URLs from the last `months_back` months.
    ///
    /// URLs come back deduplicated in first-seen order.
    pub async fn discover(&self, profile: &SourceProfile, months_back: u32, limit: usize) -> Vec<String> {
        self.discover_from(profile, months_back, limit, Local::now().date_naive())
            .await
    }

    #[instrument(level = "info", skip(self, profile), fields(source = %profile.publication))]
    pub async fn discover_from(
        &self,
        profile: &SourceProfile,
        months_back: u32,
        limit: usize,
        today: NaiveDate,
    ) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Vec<String> = Vec::new();
        if limit == 0 {
            return out;
        }

        let max_pages = if profile.has_monthly_archive() { self.max_pages } else { 1 };

        for index_url in profile.index_urls(months_back, today) {
            for page in 1..=max_pages {
                let url = page_url(&index_url, page);
                let html = match self.fetcher.fetch_text(&url).await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(%url, error = %e, "Index page fetch failed; moving to next index");
                        break;
                    }
                };
                let Ok(base) = Url::parse(&url) else {
                    break;
                };

                let before = out.len();
                for link in extract_links(&html, &base) {
                    if profile.is_article(&link) && seen.insert(link.clone()) {
                        out.push(link);
                    }
                    if out.len() >= limit {
                        break;
                    }
                }

                let gained = out.len() - before;
                debug!(%url, page, gained, total = out.len(), "Scanned index page");
                if gained == 0 || out.len() >= limit {
                    break;
                }
            }
            if out.len() >= limit {
                break;
            }
        }

        out.truncate(limit);
        info!(count = out.len(), months_back, "Collected article URLs");
        out
    }
}
