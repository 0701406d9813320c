//! Splitting an article list into batches sized for the summarizer.
//!
//! Single pass, input order. Before an article is added, the open batch is
//! closed if it is already at `max_articles` or if the article's text would
//! push the running total past `max_chars`. The article always lands in the
//! (possibly fresh) open batch, so an oversized article is never split or
//! lost.

use crate::config::BatchLimits;
use crate::models::NormalizedArticle;
use tracing::debug;

pub fn chunk(articles: Vec<NormalizedArticle>, limits: &BatchLimits) -> Vec<Vec<NormalizedArticle>> {
    let mut batches: Vec<Vec<NormalizedArticle>> = Vec::new();
    let mut current: Vec<NormalizedArticle> = Vec::new();
    let mut current_chars = 0usize;

    for article in articles {
        let len = article.text.chars().count();
        let full = current.len() >= limits.max_articles;
        let over_budget = current_chars + len > limits.max_chars;

        if !current.is_empty() && (full || over_budget) {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(article);
        current_chars += len;
    }
    if !current.is_empty() {
        batches.push(current);
    }

    debug!(batches = batches.len(), "Chunked articles");
    batches
}
