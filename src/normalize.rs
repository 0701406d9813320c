//! The clean operation: RawArticle batches in, summarized NormalizedArticles out.
//!
//! Articles are batched with [`chunk`], each batch is sent to the model with
//! the schema description, and the reply is parsed and re-validated. A batch
//! whose reply cannot be parsed or fails validation is dropped as a whole;
//! the other batches still go through.

use crate::api::AskAsync;
use crate::chunk::chunk;
use crate::config::BatchLimits;
use crate::error::Result;
use crate::models::{NormalizedArticle, RawArticle};
use crate::utils::{looks_truncated, strip_code_fences, truncate_for_log};
use itertools::Itertools;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const SCHEMA_DESCRIPTION: &str = "Each article must include:
- id (string)
- source (\"TechCrunch\" | \"Lenny\" | \"TLDR\")
- url (string, valid URL)
- publishedDate (ISO-8601 string or \"\")
- author (string)
- title (string)
- text (string)
- summary (string)";

pub struct Normalizer<A> {
    asker: A,
    limits: BatchLimits,
}

impl<A> Normalizer<A>
where
    A: AskAsync<Response = String> + Sync,
{
    pub fn new(asker: A, limits: BatchLimits) -> Self {
        Self { asker, limits }
    }

    /// Normalize and summarize `articles`, one model call per batch.
    ///
    /// The result never holds more than one record per input URL.
    #[instrument(level = "info", skip_all, fields(articles = articles.len()))]
    pub async fn clean(&self, articles: &[RawArticle]) -> Vec<NormalizedArticle> {
        let t0 = Instant::now();
        let batches = chunk(articles.iter().map(NormalizedArticle::from).collect(), &self.limits);
        let total_batches = batches.len();
        let mut cleaned: Vec<NormalizedArticle> = Vec::new();

        // Batches run one at a time.
        for (index, batch) in batches.iter().enumerate() {
            match self.clean_batch(batch).await {
                Ok(items) => {
                    debug!(index, items = items.len(), "Batch normalized");
                    cleaned.extend(items);
                }
                Err(e) => warn!(index, size = batch.len(), error = %e, "Dropping batch"),
            }
        }

        let cleaned: Vec<NormalizedArticle> = cleaned.into_iter().unique_by(|a| a.id.clone()).collect();
        info!(
            batches = total_batches,
            cleaned = cleaned.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Clean complete"
        );
        cleaned
    }

    async fn clean_batch(&self, batch: &[NormalizedArticle]) -> Result<Vec<NormalizedArticle>> {
        let prompt = user_prompt(batch)?;
        let reply = self.asker.ask(&prompt).await?;

        let items = match parse_reply(&reply) {
            Ok(items) => items,
            Err(e) if looks_truncated(&e) => {
                warn!(error = %e, reply = %truncate_for_log(&reply, 300), "Reply looks truncated; asking again");
                let reply = self.asker.ask(&prompt).await?;
                parse_reply(&reply)?
            }
            Err(e) => {
                debug!(reply = %truncate_for_log(&reply, 300), "Unparsable reply");
                return Err(e.into());
            }
        };

        let urls: HashSet<&str> = batch.iter().map(|a| a.url.as_str()).collect();
        let (kept, foreign): (Vec<_>, Vec<_>) = items.into_iter().partition(|a| urls.contains(a.url.as_str()));
        if !foreign.is_empty() {
            warn!(count = foreign.len(), "Discarding items for URLs outside the batch");
        }
        Ok(kept)
    }
}

fn user_prompt(batch: &[NormalizedArticle]) -> Result<String> {
    let articles = serde_json::to_string(batch)?;
    Ok(format!(
        "Extract and normalize the following articles.\n\
         Output: a JSON array matching this schema:\n\
         {SCHEMA_DESCRIPTION}\n\n\
         Articles:\n{articles}"
    ))
}

/// Every item is validated as it deserializes; one bad item fails the lot.
fn parse_reply(reply: &str) -> std::result::Result<Vec<NormalizedArticle>, serde_json::Error> {
    serde_json::from_str(strip_code_fences(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::Publication;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every prompt.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl AskAsync for Scripted {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(text.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::TextGeneration("script exhausted".to_string())))
        }
    }

    fn raw(slug: &str) -> RawArticle {
        RawArticle {
            url: format!("https://techcrunch.com/2025/05/06/{slug}/"),
            publication: Publication::TechCrunch,
            title: slug.to_string(),
            subtitle: None,
            date: Some("2025-05-06T12:00:00.000Z".to_string()),
            text: format!("Body of {slug}"),
        }
    }

    fn item(slug: &str, source: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("https://techcrunch.com/2025/05/06/{slug}/"),
            "source": source,
            "url": format!("https://techcrunch.com/2025/05/06/{slug}/"),
            "publishedDate": "2025-05-06T12:00:00.000Z",
            "author": "",
            "title": slug,
            "text": format!("Body of {slug}"),
            "summary": format!("Summary of {slug}.")
        })
    }

    fn reply(items: Vec<serde_json::Value>) -> Result<String> {
        Ok(serde_json::Value::Array(items).to_string())
    }

    fn one_per_batch() -> BatchLimits {
        BatchLimits {
            max_articles: 1,
            max_chars: 10_000,
        }
    }

    #[tokio::test]
    async fn test_clean_single_batch_with_fenced_reply() {
        let fenced = format!(
            "```json\n{}\n```",
            serde_json::json!([item("a", "TechCrunch"), item("b", "TechCrunch")])
        );
        let n = Normalizer::new(Scripted::new(vec![Ok(fenced)]), BatchLimits::default());

        let out = n.clean(&[raw("a"), raw("b")]).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].summary, "Summary of a.");
        assert_eq!(n.asker.calls(), 1);
        let prompt = &n.asker.prompts.lock().unwrap()[0];
        assert!(prompt.contains(SCHEMA_DESCRIPTION));
        assert!(prompt.contains("https://techcrunch.com/2025/05/06/a/"));
    }

    #[tokio::test]
    async fn test_truncated_reply_is_asked_again_once() {
        let n = Normalizer::new(
            Scripted::new(vec![
                Ok(r#"[{"id": "https://techcrunch.com/2025/05/06/a/", "sou"#.to_string()),
                reply(vec![item("a", "TechCrunch")]),
            ]),
            BatchLimits::default(),
        );

        let out = n.clean(&[raw("a")]).await;

        assert_eq!(out.len(), 1);
        assert_eq!(n.asker.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_item_drops_only_its_batch() {
        let n = Normalizer::new(
            Scripted::new(vec![
                reply(vec![item("a", "Daily Planet")]),
                reply(vec![item("b", "TechCrunch")]),
            ]),
            one_per_batch(),
        );

        let out = n.clean(&[raw("a"), raw("b")]).await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "b");
    }

    #[tokio::test]
    async fn test_failed_ask_drops_batch_and_continues() {
        let n = Normalizer::new(
            Scripted::new(vec![
                Err(Error::TextGeneration("down".to_string())),
                reply(vec![item("b", "TechCrunch")]),
            ]),
            one_per_batch(),
        );

        let out = n.clean(&[raw("a"), raw("b")]).await;

        assert_eq!(out.len(), 1);
        assert_eq!(n.asker.calls(), 2);
    }

    #[tokio::test]
    async fn test_foreign_and_duplicate_items_are_removed() {
        let n = Normalizer::new(
            Scripted::new(vec![reply(vec![
                item("a", "TechCrunch"),
                item("a", "TechCrunch"),
                item("invented", "TechCrunch"),
            ])]),
            BatchLimits::default(),
        );

        let out = n.clean(&[raw("a")]).await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://techcrunch.com/2025/05/06/a/");
    }

    #[tokio::test]
    async fn test_non_json_reply_drops_batch_without_retry() {
        let n = Normalizer::new(
            Scripted::new(vec![Ok("Sorry, I can't help with that.".to_string())]),
            BatchLimits::default(),
        );

        assert!(n.clean(&[raw("a")]).await.is_empty());
        assert_eq!(n.asker.calls(), 1);
    }
}
