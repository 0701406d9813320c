//! Data models for scraped and normalized articles.
//!
//! - [`Publication`]: the sources this crate knows how to scrape
//! - [`RawArticle`]: one scraped article, produced by the source scraper
//! - [`NormalizedArticle`]: the display schema, optionally carrying a summary
//!
//! Both article types deserialize through an unchecked mirror struct and are
//! validated on the way in, so a value of either type that came from JSON
//! (a tool request, a model reply, a file on disk) has already passed the
//! schema check.

use crate::error::ValidationError;
use crate::utils::is_iso_datetime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// A known news source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Publication {
    TechCrunch,
    Lenny,
    #[serde(rename = "TLDR")]
    Tldr,
}

impl Publication {
    pub const ALL: [Publication; 3] = [Publication::TechCrunch, Publication::Lenny, Publication::Tldr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Publication::TechCrunch => "TechCrunch",
            Publication::Lenny => "Lenny",
            Publication::Tldr => "TLDR",
        }
    }

    /// Map an article URL to the publication that hosts it.
    ///
    /// Substack-hosted pages are treated as Lenny's Newsletter.
    pub fn from_url(url: &str) -> Option<Publication> {
        let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
        if host.ends_with("techcrunch.com") {
            Some(Publication::TechCrunch)
        } else if host.contains("lennysnewsletter") || host.contains("substack") {
            Some(Publication::Lenny)
        } else if host.ends_with("tldr.tech") {
            Some(Publication::Tldr)
        } else {
            None
        }
    }
}

impl fmt::Display for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Publication {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "techcrunch" => Ok(Publication::TechCrunch),
            "lenny" => Ok(Publication::Lenny),
            "tldr" => Ok(Publication::Tldr),
            _ => Err(ValidationError::UnknownSource(s.to_string())),
        }
    }
}

/// A scraped article before normalization.
///
/// `url` is the unique key. `date`, when present, is an ISO-8601 UTC string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedRawArticle")]
pub struct RawArticle {
    pub url: String,
    pub publication: Publication,
    pub title: String,
    pub subtitle: Option<String>,
    pub date: Option<String>,
    pub text: String,
}

#[derive(Deserialize)]
struct UncheckedRawArticle {
    url: String,
    publication: Publication,
    title: String,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    date: Option<String>,
    text: String,
}

impl TryFrom<UncheckedRawArticle> for RawArticle {
    type Error = ValidationError;

    fn try_from(raw: UncheckedRawArticle) -> Result<Self, Self::Error> {
        RawArticle {
            url: raw.url,
            publication: raw.publication,
            title: raw.title,
            subtitle: raw.subtitle,
            date: raw.date,
            text: raw.text,
        }
        .validate()
    }
}

impl RawArticle {
    /// Check the record against the schema, returning it unchanged on success.
    pub fn validate(self) -> Result<Self, ValidationError> {
        check_url("url", &self.url)?;
        if self.title.trim().is_empty() {
            return Err(ValidationError::Empty { field: "title" });
        }
        if self.text.trim().is_empty() {
            return Err(ValidationError::Empty { field: "text" });
        }
        if let Some(date) = &self.date {
            if !is_iso_datetime(date) {
                return Err(ValidationError::InvalidDate {
                    field: "date",
                    value: date.clone(),
                });
            }
        }
        Ok(self)
    }
}

/// An article in the display schema.
///
/// Built directly from a [`RawArticle`] (empty summary) or returned by the
/// summarizer (summary populated, re-validated on deserialization).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "UncheckedNormalizedArticle")]
pub struct NormalizedArticle {
    pub id: String,
    pub source: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    pub author: String,
    pub title: String,
    pub text: String,
    pub summary: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UncheckedNormalizedArticle {
    #[serde(default)]
    id: Option<String>,
    source: String,
    url: String,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    author: Option<String>,
    title: String,
    text: String,
    summary: String,
}

impl TryFrom<UncheckedNormalizedArticle> for NormalizedArticle {
    type Error = ValidationError;

    fn try_from(raw: UncheckedNormalizedArticle) -> Result<Self, Self::Error> {
        // Models write "" for unknown values; that means absent.
        let published_date = raw.published_date.filter(|d| !d.trim().is_empty());
        let id = raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| raw.url.clone());

        NormalizedArticle {
            id,
            source: raw.source,
            url: raw.url,
            published_date,
            author: raw.author.unwrap_or_default(),
            title: raw.title.trim().to_string(),
            text: raw.text,
            summary: raw.summary,
        }
        .validate()
    }
}

impl NormalizedArticle {
    /// Check the record against the schema. `source` is rewritten to the
    /// publication's canonical spelling.
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        check_url("url", &self.url)?;
        self.source = Publication::from_str(&self.source)?.as_str().to_string();
        if let Some(date) = &self.published_date {
            if !is_iso_datetime(date) {
                return Err(ValidationError::InvalidDate {
                    field: "publishedDate",
                    value: date.clone(),
                });
            }
        }
        Ok(self)
    }
}

impl From<&RawArticle> for NormalizedArticle {
    fn from(raw: &RawArticle) -> Self {
        NormalizedArticle {
            id: raw.url.clone(),
            source: raw.publication.as_str().to_string(),
            url: raw.url.clone(),
            published_date: raw.date.clone(),
            author: String::new(),
            title: raw.title.clone(),
            text: raw.text.clone(),
            summary: String::new(),
        }
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ValidationError> {
    match Url::parse(value) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => Ok(()),
        _ => Err(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: &str, text: &str) -> RawArticle {
        RawArticle {
            url: url.to_string(),
            publication: Publication::TechCrunch,
            title: "Title".to_string(),
            subtitle: None,
            date: Some("2025-05-06T12:00:00.000Z".to_string()),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_publication_from_url() {
        assert_eq!(
            Publication::from_url("https://techcrunch.com/2025/05/06/story/"),
            Some(Publication::TechCrunch)
        );
        assert_eq!(
            Publication::from_url("https://www.lennysnewsletter.com/p/how-to"),
            Some(Publication::Lenny)
        );
        assert_eq!(
            Publication::from_url("https://tldr.tech/ai/2025-05-06"),
            Some(Publication::Tldr)
        );
        assert_eq!(Publication::from_url("https://example.com/"), None);
        assert_eq!(Publication::from_url("not a url"), None);
    }

    #[test]
    fn test_publication_serde_names() {
        assert_eq!(serde_json::to_string(&Publication::Tldr).unwrap(), "\"TLDR\"");
        assert_eq!(
            serde_json::from_str::<Publication>("\"TechCrunch\"").unwrap(),
            Publication::TechCrunch
        );
    }

    #[test]
    fn test_raw_article_validate_ok() {
        let a = raw("https://techcrunch.com/2025/05/06/story/", "body");
        assert_eq!(a.clone().validate(), Ok(a));
    }

    #[test]
    fn test_raw_article_rejects_empty_text() {
        let a = raw("https://techcrunch.com/2025/05/06/story/", "   ");
        assert_eq!(a.validate(), Err(ValidationError::Empty { field: "text" }));
    }

    #[test]
    fn test_raw_article_rejects_relative_url() {
        let a = raw("/2025/05/06/story/", "body");
        assert!(matches!(
            a.validate(),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_raw_article_rejects_bad_date() {
        let mut a = raw("https://techcrunch.com/2025/05/06/story/", "body");
        a.date = Some("last tuesday".to_string());
        assert!(matches!(
            a.validate(),
            Err(ValidationError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_raw_article_deserialization_validates() {
        let ok = r#"{
            "url": "https://techcrunch.com/2025/05/06/story/",
            "publication": "TechCrunch",
            "title": "Story",
            "subtitle": null,
            "date": null,
            "text": "Body"
        }"#;
        assert!(serde_json::from_str::<RawArticle>(ok).is_ok());

        let bad = r#"{
            "url": "https://techcrunch.com/2025/05/06/story/",
            "publication": "TechCrunch",
            "title": "",
            "text": "Body"
        }"#;
        assert!(serde_json::from_str::<RawArticle>(bad).is_err());
    }

    #[test]
    fn test_normalized_from_raw() {
        let a = raw("https://techcrunch.com/2025/05/06/story/", "body");
        let n = NormalizedArticle::from(&a);
        assert_eq!(n.id, a.url);
        assert_eq!(n.source, "TechCrunch");
        assert_eq!(n.published_date, a.date);
        assert_eq!(n.author, "");
        assert_eq!(n.summary, "");
    }

    #[test]
    fn test_normalized_deserialization_defaults() {
        let json = r#"{
            "source": "TLDR",
            "url": "https://tldr.tech/ai/2025-05-06",
            "publishedDate": "",
            "title": "  Spaced  ",
            "text": "Body",
            "summary": "Short."
        }"#;
        let n: NormalizedArticle = serde_json::from_str(json).unwrap();
        assert_eq!(n.id, "https://tldr.tech/ai/2025-05-06");
        assert_eq!(n.published_date, None);
        assert_eq!(n.author, "");
        assert_eq!(n.title, "Spaced");
    }

    #[test]
    fn test_normalized_source_is_canonicalized() {
        let json = r#"{
            "source": " tldr ",
            "url": "https://tldr.tech/ai/2025-05-06",
            "title": "T",
            "text": "Body",
            "summary": ""
        }"#;
        let n: NormalizedArticle = serde_json::from_str(json).unwrap();
        assert_eq!(n.source, "TLDR");
    }

    #[test]
    fn test_normalized_rejects_unknown_source() {
        let json = r#"{
            "id": "x",
            "source": "Daily Planet",
            "url": "https://example.com/a",
            "title": "T",
            "text": "Body",
            "summary": ""
        }"#;
        assert!(serde_json::from_str::<NormalizedArticle>(json).is_err());
    }

    #[test]
    fn test_normalized_serializes_camel_case() {
        let a = raw("https://techcrunch.com/2025/05/06/story/", "body");
        let json = serde_json::to_string(&NormalizedArticle::from(&a)).unwrap();
        assert!(json.contains("\"publishedDate\""));
        assert!(!json.contains("published_date"));
    }
}
