//! HTML to readable text, plus best-effort page metadata.
//!
//! Resolution order for each field (first non-empty wins):
//!
//! | Field | Sources |
//! |-------|---------|
//! | title | `og:title` meta, first `<h1>`, `<title>` |
//! | text | `<p>` text inside `<article>`, else `<main>`, else `<body>`; then a tag-stripping pass |
//! | date | `article:published_time` meta, `<time datetime>` |
//! | description | `meta[name=description]`, `og:description` meta |
//!
//! Links are resolved against the page's base URL. A link that fails to
//! resolve is skipped; it never fails the page.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static CSS selector")
}

static OG_TITLE: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:title"]"#));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static MAIN: Lazy<Selector> = Lazy::new(|| selector("main"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static PUBLISHED_TIME: Lazy<Selector> =
    Lazy::new(|| selector(r#"meta[property="article:published_time"]"#));
static TIME_DATETIME: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
static META_DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="description"]"#));
static OG_DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:description"]"#));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("static regex"));
static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("static regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// What the extractor could read off one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
    /// Raw publish date as written on the page; not yet normalized.
    pub date: Option<String>,
    pub description: Option<String>,
}

/// Extract title, body text and metadata from `html`.
///
/// Fails with [`Error::Extraction`] only when the page yields no title, no
/// text and no description at all.
#[instrument(level = "debug", skip(html), fields(bytes = html.len()))]
pub fn extract(html: &str, base_url: &str) -> Result<Extracted> {
    let document = Html::parse_document(html);

    let title = first_attr(&document, &OG_TITLE, "content")
        .or_else(|| first_text(&document, &H1))
        .or_else(|| first_text(&document, &TITLE))
        .unwrap_or_default();

    let text = paragraph_text(&document).unwrap_or_else(|| strip_html_to_text(html));

    let date = first_attr(&document, &PUBLISHED_TIME, "content")
        .or_else(|| first_attr(&document, &TIME_DATETIME, "datetime"));

    let description = first_attr(&document, &META_DESCRIPTION, "content")
        .or_else(|| first_attr(&document, &OG_DESCRIPTION, "content"));

    if title.is_empty() && text.is_empty() && description.is_none() {
        return Err(Error::Extraction {
            url: base_url.to_string(),
            reason: "page has no title, text or description".to_string(),
        });
    }

    debug!(title_len = title.len(), text_len = text.len(), has_date = date.is_some(), "Extracted page");
    Ok(Extracted {
        title,
        text,
        date,
        description,
    })
}

/// Collect every `a[href]` in `html`, resolved against `base`.
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    links_in(&Html::parse_document(html), base)
}

/// Generic tag-stripping pass: drop script/style blocks, strip tags and
/// collapse whitespace.
pub fn strip_html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(html, "");
    let without_styles = STYLE_BLOCK.replace_all(&without_scripts, "");
    let without_tags = TAG.replace_all(&without_styles, " ");
    WHITESPACE.replace_all(&without_tags, " ").trim().to_string()
}

fn links_in(document: &Html, base: &Url) -> Vec<String> {
    document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
        .collect()
}

/// Paragraph text of the best content container, joined with single spaces.
fn paragraph_text(document: &Html) -> Option<String> {
    let container: ElementRef = document
        .select(&ARTICLE)
        .next()
        .or_else(|| document.select(&MAIN).next())
        .or_else(|| document.select(&BODY).next())
        .unwrap_or_else(|| document.root_element());

    let joined = container
        .select(&PARAGRAPH)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    (!joined.is_empty()).then_some(joined)
}

fn first_attr(document: &Html, sel: &Selector, attr: &str) -> Option<String> {
    document
        .select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn first_text(document: &Html, sel: &Selector) -> Option<String> {
    document
        .select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|v| !v.is_empty())
}
