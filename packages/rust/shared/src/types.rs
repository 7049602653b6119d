//! Core domain types shared by the search, scrape, and writing stages.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one pipeline run (time-sortable), recorded on log spans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SearchResult
// ---------------------------------------------------------------------------

/// A candidate article reference returned by the news search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Headline, entity-decoded.
    pub title: String,
    /// Article link. Unique within one result list.
    pub url: String,
    /// Plain-text summary from the feed description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Feed publication date, when present and parseable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ScrapedArticle
// ---------------------------------------------------------------------------

/// A search result enriched with extracted article text.
///
/// `content == None` means extraction failed or found nothing readable;
/// the article is still usable through its title and summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub title: String,
    /// Always equal to the url of the originating [`SearchResult`].
    pub url: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Why extraction failed. Logged, never sent to the writer model.
    #[serde(skip)]
    pub error: Option<String>,
}

impl ScrapedArticle {
    /// Summary-only stand-in built straight from a search result.
    pub fn placeholder(result: &SearchResult) -> Self {
        Self {
            title: result.title.clone(),
            url: result.url.clone(),
            summary: result.summary.clone(),
            content: None,
            published_at: result.published_at,
            error: None,
        }
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

// ---------------------------------------------------------------------------
// GeneratedChunk
// ---------------------------------------------------------------------------

/// One incremental unit of streamed output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedChunk {
    /// Text to append to the post.
    pub content: String,
    /// Source URLs or citation strings the model attributed to this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeSet<String>>,
}

impl GeneratedChunk {
    /// A plain text chunk with no attributions.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sources: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn scraped_article_serialization_hides_error_note() {
        let article = ScrapedArticle {
            title: "Hospitals adopt AI triage".into(),
            url: "https://news.example.com/a".into(),
            summary: Some("Short summary".into()),
            content: None,
            published_at: None,
            error: Some("network error: connection reset".into()),
        };

        let json = serde_json::to_value(&article).expect("serialize");
        assert_eq!(json["url"], "https://news.example.com/a");
        // Absent content is still an explicit field for the writer
        assert!(json["content"].is_null());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn placeholder_keeps_url_and_summary() {
        let result = SearchResult {
            title: "Title".into(),
            url: "https://news.example.com/b".into(),
            summary: Some("Feed summary".into()),
            published_at: None,
        };
        let placeholder = ScrapedArticle::placeholder(&result);
        assert_eq!(placeholder.url, result.url);
        assert_eq!(placeholder.summary, result.summary);
        assert!(!placeholder.has_content());
    }

    #[test]
    fn chunk_without_sources_omits_field() {
        let json = serde_json::to_string(&GeneratedChunk::text("Hello")).expect("serialize");
        assert_eq!(json, r#"{"content":"Hello"}"#);
    }
}
