//! RSS feed parser.
//!
//! Items are read with a `quick-xml` pull parser. Feeds that are not
//! well-formed XML (mismatched or stray end tags are common in the wild) fall
//! back to pattern extraction over the raw text. Either way each item goes
//! through the same normalization:
//! - entity-decoded title, required
//! - trimmed link, required, deduplicated (first occurrence wins)
//! - description decoded and stripped of tags into a plain-text summary
//! - `pubDate` parsed as RFC 2822 when possible

use std::collections::HashSet;
use std::sync::LazyLock;

use blogsmith_shared::{BlogsmithError, Result, SearchResult};
use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Raw items
// ---------------------------------------------------------------------------

/// Item fields as found in the feed, before validation.
#[derive(Debug, Default)]
struct RawItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum ItemField {
    Title,
    Link,
    Description,
    PubDate,
}

impl ItemField {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"description" => Some(Self::Description),
            b"pubDate" => Some(Self::PubDate),
            _ => None,
        }
    }
}

impl RawItem {
    fn push(&mut self, field: ItemField, text: &str) {
        let slot = match field {
            ItemField::Title => &mut self.title,
            ItemField::Link => &mut self.link,
            ItemField::Description => &mut self.description,
            ItemField::PubDate => &mut self.pub_date,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse a feed body into at most `max_results` unique search results, in feed order.
pub(crate) fn parse_feed(feed: &str, max_results: usize) -> Vec<SearchResult> {
    let raw_items = match read_items_xml(feed) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "feed is not well-formed XML, falling back to pattern extraction");
            read_items_with_patterns(feed)
        }
    };

    debug!(items = raw_items.len(), "feed items read");
    accept_items(raw_items, max_results)
}

/// Validate, normalize, and deduplicate raw items.
fn accept_items(raw_items: Vec<RawItem>, max_results: usize) -> Vec<SearchResult> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut results = Vec::new();

    for item in raw_items {
        if results.len() >= max_results {
            break;
        }

        let title = item
            .title
            .map(|t| decode_html_entities(&t).trim().to_string())
            .filter(|t| !t.is_empty());
        let url = item
            .link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let (Some(title), Some(url)) = (title, url) else {
            continue;
        };

        if !seen_urls.insert(url.clone()) {
            debug!(%url, "duplicate feed item skipped");
            continue;
        }

        results.push(SearchResult {
            title,
            url,
            summary: item.description.as_deref().and_then(plain_text_summary),
            published_at: item.pub_date.as_deref().and_then(parse_pub_date),
        });
    }

    results
}

/// Decode entities, drop tags, and collapse whitespace.
fn plain_text_summary(description: &str) -> Option<String> {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

    let decoded = decode_html_entities(description);
    let stripped = TAG_RE.replace_all(&decoded, "");
    let summary = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    (!summary.is_empty()).then_some(summary)
}

fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Structured path
// ---------------------------------------------------------------------------

/// Read `<item>` records with the XML pull parser.
///
/// Text nodes are entity-decoded at this layer (as an XML parser would);
/// CDATA sections are kept verbatim.
fn read_items_xml(feed: &str) -> Result<Vec<RawItem>> {
    let mut reader = Reader::from_str(feed);
    let mut items = Vec::new();
    let mut current: Option<RawItem> = None;
    let mut field: Option<ItemField> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            BlogsmithError::parse(format!(
                "feed XML error at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            // Prefixed names (`dc:title`, `media:description`) are other fields
            Event::Start(tag) => {
                let name = tag.name();
                if name.as_ref() == b"item" {
                    current = Some(RawItem::default());
                    field = None;
                } else if current.is_some() {
                    field = ItemField::from_tag(name.as_ref());
                }
            }
            Event::Text(text) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let raw = String::from_utf8_lossy(&text);
                    item.push(f, &decode_html_entities(&raw));
                }
            }
            Event::CData(cdata) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(&cdata));
                }
            }
            Event::End(tag) => {
                let name = tag.name();
                if name.as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

// ---------------------------------------------------------------------------
// Pattern fallback
// ---------------------------------------------------------------------------

static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>").expect("item regex"));

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").expect("title regex"));

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<link\b[^>]*>(.*?)</link>").expect("link regex"));

static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<description\b[^>]*>(.*?)</description>").expect("description regex")
});

static PUB_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pubDate\b[^>]*>(.*?)</pubDate>").expect("pubDate regex"));

/// Scrape `<item>` blocks out of text that the XML parser rejected.
fn read_items_with_patterns(feed: &str) -> Vec<RawItem> {
    ITEM_RE
        .captures_iter(feed)
        .map(|caps| {
            let body = caps.get(1).map_or("", |m| m.as_str());
            RawItem {
                title: capture_text(&TITLE_RE, body),
                link: capture_text(&LINK_RE, body),
                description: capture_text(&DESCRIPTION_RE, body),
                pub_date: capture_text(&PUB_DATE_RE, body),
            }
        })
        .collect()
}

/// First capture of `re` in `body`, with a CDATA wrapper unwrapped or, for
/// plain text, one layer of entity decoding.
fn capture_text(re: &Regex, body: &str) -> Option<String> {
    let inner = re.captures(body)?.get(1)?.as_str().trim();

    let text = match inner
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
    {
        Some(cdata) => cdata.to_string(),
        None => decode_html_entities(inner).into_owned(),
    };

    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/rss/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn urls(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn dedups_keeping_first_occurrence() {
        let feed = load_fixture("google-news.xml");
        let results = parse_feed(&feed, 10);

        assert_eq!(
            urls(&results),
            vec![
                "https://news.example.com/a",
                "https://news.example.com/b",
                "https://news.example.com/c",
            ]
        );
        // The kept "a" is the first one in feed order
        assert_eq!(results[0].title, "AI triage tools reach rural hospitals - Health Daily");
    }

    #[test]
    fn decodes_entities_and_strips_tags() {
        let feed = load_fixture("google-news.xml");
        let results = parse_feed(&feed, 10);

        let b = &results[1];
        assert_eq!(b.title, "Regulators & insurers weigh in on diagnostic AI - MedWire");
        let summary = b.summary.as_deref().expect("summary");
        assert!(!summary.contains('<'));
        assert!(!summary.contains("&nbsp;"));
        assert!(summary.contains("Regulators & insurers weigh in on diagnostic AI"));
        assert!(summary.contains("MedWire"));
    }

    #[test]
    fn parses_pub_date() {
        let feed = load_fixture("google-news.xml");
        let results = parse_feed(&feed, 10);

        let published = results[0].published_at.expect("pubDate");
        assert_eq!(published.to_rfc3339(), "2026-10-14T08:30:00+00:00");
    }

    #[test]
    fn stops_at_max_results() {
        let feed = load_fixture("google-news.xml");
        let results = parse_feed(&feed, 2);
        assert_eq!(
            urls(&results),
            vec!["https://news.example.com/a", "https://news.example.com/b"]
        );
    }

    #[test]
    fn channel_title_is_not_an_item() {
        let feed = load_fixture("google-news.xml");
        let results = parse_feed(&feed, 10);
        assert!(results.iter().all(|r| !r.title.contains("Google News")));
    }

    #[test]
    fn skips_items_missing_title_or_link() {
        let feed = r#"<?xml version="1.0"?>
<rss><channel>
  <item><title>No link here</title></item>
  <item><link>https://news.example.com/untitled</link></item>
  <item><title>   </title><link>https://news.example.com/blank</link></item>
  <item><title>Kept</title><link> https://news.example.com/kept </link></item>
</channel></rss>"#;
        let results = parse_feed(feed, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Kept");
        assert_eq!(results[0].url, "https://news.example.com/kept");
        assert_eq!(results[0].summary, None);
    }

    #[test]
    fn reads_cdata_sections() {
        let feed = r#"<rss><channel><item>
  <title><![CDATA[Chips & Salsa: a <b>bold</b> take]]></title>
  <link>https://news.example.com/cdata</link>
  <description><![CDATA[<p>First&nbsp;paragraph</p>]]></description>
</item></channel></rss>"#;
        let results = parse_feed(feed, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Chips & Salsa: a <b>bold</b> take");
        assert_eq!(results[0].summary.as_deref(), Some("First paragraph"));
    }

    #[test]
    fn malformed_feed_falls_back_to_patterns() {
        let feed = load_fixture("malformed.xml");
        assert!(read_items_xml(&feed).is_err());

        let results = parse_feed(&feed, 10);
        assert_eq!(
            urls(&results),
            vec![
                "https://news.example.com/x",
                "https://news.example.com/y",
            ]
        );
        assert_eq!(results[0].title, "Telehealth & AI: what changed");
        assert_eq!(results[1].summary.as_deref(), Some("Nurses report fewer night shifts"));
    }

    #[test]
    fn inline_tags_do_not_split_words() {
        let summary = plain_text_summary(
            r#"&lt;b&gt;AI&lt;/b&gt;-driven care&lt;a href="x"&gt;&lt;/a&gt;."#,
        );
        assert_eq!(summary.as_deref(), Some("AI-driven care."));
    }

    #[test]
    fn namespaced_fields_are_ignored() {
        let feed = r#"<rss xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:media="http://search.yahoo.com/mrss/">
<channel><item>
  <title>Real headline</title>
  <dc:title>Dublin Core headline</dc:title>
  <link>https://news.example.com/ns</link>
  <description>Real summary</description>
  <media:description>Caption text</media:description>
</item></channel></rss>"#;
        let results = parse_feed(feed, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Real headline");
        assert_eq!(results[0].summary.as_deref(), Some("Real summary"));
    }

    #[test]
    fn non_feed_body_yields_nothing() {
        let results = parse_feed("<html><body><h1>Rate limited</h1></body></html>", 10);
        assert!(results.is_empty());
    }
}
