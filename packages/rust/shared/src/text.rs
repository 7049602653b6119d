//! Normalization for untrusted free text (topics, style guidelines, model replies).

use std::sync::LazyLock;

use regex::Regex;

/// ASCII control characters except tab, line feed, and carriage return.
static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("control char regex")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Strip control characters, collapse whitespace runs to one space, trim,
/// and cap the result at `max_length` characters.
///
/// Never fails; `None` is treated as the empty string. Idempotent: the cut
/// is re-trimmed so a truncated result never ends in whitespace.
pub fn sanitize(text: Option<&str>, max_length: usize) -> String {
    let text = text.unwrap_or("");
    let cleaned = CONTROL_RE.replace_all(text, "");
    let collapsed = WHITESPACE_RE.replace_all(&cleaned, " ");
    let trimmed = collapsed.trim();

    match trimmed.char_indices().nth(max_length) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
