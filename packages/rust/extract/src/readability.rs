//! Readability heuristics: find the article body and title in a news page
//! and render the body as Markdown text.

use std::sync::LazyLock;

use blogsmith_shared::{BlogsmithError, Result};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

/// Candidate containers for the article body, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    r#"[itemprop="articleBody"]"#,
    "article",
    "main",
    r#"[role="main"]"#,
    ".article-body",
    ".post-content",
    ".entry-content",
    ".content",
];

/// Elements that never carry article text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "form", "iframe", "noscript", "svg",
    "button",
];

/// Title and readable body of one page.
#[derive(Debug, Clone, Default)]
pub(crate) struct Readable {
    pub title: Option<String>,
    /// Markdown rendering of the body, possibly empty.
    pub text: String,
}

/// Extract the title and body text from a full HTML document.
pub(crate) fn extract_readable(html: &str) -> Result<Readable> {
    let doc = Html::parse_document(html);

    let title = extract_title(&doc);
    let body_html = content_html(&doc);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let markdown = converter
        .convert(&body_html)
        .map_err(|e| BlogsmithError::Extraction(format!("htmd conversion failed: {e}")))?;

    let text = tidy_markdown(&markdown);
    debug!(title = ?title, text_len = text.len(), "page made readable");

    Ok(Readable { title, text })
}

/// Prefer the Open Graph title, then the first H1, then `<title>`.
fn extract_title(doc: &Html) -> Option<String> {
    let og_sel = Selector::parse(r#"meta[property="og:title"]"#).unwrap();
    let h1_sel = Selector::parse("h1").unwrap();
    let title_sel = Selector::parse("title").unwrap();

    doc.select(&og_sel)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|t| !t.is_empty())
        .or_else(|| {
            doc.select(&h1_sel)
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .find(|t| !t.is_empty())
        })
        .or_else(|| {
            doc.select(&title_sel)
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .find(|t| !t.is_empty())
        })
}

/// Inner HTML of the first matching content container, or of `<body>`.
fn content_html(doc: &Html) -> String {
    for sel_str in CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next() {
            let text_len: usize = el.text().map(|t| t.trim().len()).sum();
            if text_len > 0 {
                debug!(selector = sel_str, "content container found");
                return el.inner_html();
            }
        }
    }

    let body_sel = Selector::parse("body").unwrap();
    doc.select(&body_sel)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_default()
}

/// Trim trailing spaces and collapse runs of blank lines.
fn tidy_markdown(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let trimmed_lines = md
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    MULTI_BLANK_RE
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
