//! Direct scraping: fetch the article page ourselves and run the extractor.

use super::ScrapedPage;
use crate::error::Result;
use crate::extract::extract;
use crate::fetcher::Fetcher;
use crate::retry::RetryPolicy;
use tracing::{debug, instrument};

/// Attempts per article on the fallback path.
pub const FALLBACK_ATTEMPTS: u32 = 2;

/// Same client and backoff as `fetcher`, capped at [`FALLBACK_ATTEMPTS`].
pub fn fallback_fetcher(fetcher: Fetcher) -> Fetcher {
    let backoff = fetcher.policy().backoff;
    fetcher.with_policy(RetryPolicy::new(FALLBACK_ATTEMPTS, backoff))
}

#[instrument(level = "debug", skip(fetcher))]
pub async fn scrape(fetcher: &Fetcher, url: &str) -> Result<ScrapedPage> {
    let html = fetcher.fetch_text(url).await?;
    let extracted = extract(&html, url)?;
    debug!(title = %extracted.title, text_len = extracted.text.len(), "Direct scrape extracted page");

    Ok(ScrapedPage {
        title: Some(extracted.title).filter(|t| !t.is_empty()),
        markdown: None,
        text: Some(extracted.text).filter(|t| !t.is_empty()),
        html: Some(html),
        date: extracted.date,
        subtitle: None,
        description: extracted.description,
    })
}
