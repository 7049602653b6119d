//! SSE parser for streamed chat completions.
//!
//! Turns the raw response byte stream into [`ModelDelta`] values. Lines are
//! split on raw bytes so multi-byte characters cut across network chunks
//! decode correctly. `data: [DONE]` ends the stream.

use std::collections::BTreeSet;
use std::pin::Pin;
use std::task::{Context, Poll};

use blogsmith_shared::{BlogsmithError, Result, truncate_chars};
use bytes::Bytes;
use futures::stream::Stream;
use serde::Deserialize;

use crate::ModelDelta;

#[derive(Debug, Deserialize)]
struct StreamChunkRaw {
    #[serde(default)]
    choices: Vec<StreamChoiceRaw>,
    #[serde(default)]
    error: Option<StreamErrorRaw>,
}

#[derive(Debug, Deserialize)]
struct StreamChoiceRaw {
    #[serde(default)]
    delta: Option<DeltaRaw>,
}

#[derive(Debug, Deserialize)]
struct DeltaRaw {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    annotations: Vec<AnnotationRaw>,
}

#[derive(Debug, Deserialize)]
struct AnnotationRaw {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url_citation: Option<UrlCitationRaw>,
}

#[derive(Debug, Deserialize)]
struct UrlCitationRaw {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StreamErrorRaw {
    message: String,
}

/// Stream adapter from SSE bytes to [`ModelDelta`] values.
pub struct DeltaStream<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    done: bool,
}

impl<S> DeltaStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send,
{
    pub(crate) fn new(byte_stream: S) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: Vec::new(),
            done: false,
        }
    }
}

impl<S> Stream for DeltaStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send,
{
    type Item = Result<ModelDelta>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.done {
                return Poll::Ready(None);
            }

            if let Some(event) = next_event(&mut this.buffer, false) {
                return Poll::Ready(this.finish(event));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(BlogsmithError::Network(format!(
                        "model stream interrupted: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    // A final line without a trailing newline is still an event
                    let event = next_event(&mut this.buffer, true);
                    this.done = true;
                    return Poll::Ready(event.and_then(|e| this.finish(e)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> DeltaStream<S> {
    fn finish(&mut self, event: Event) -> Option<Result<ModelDelta>> {
        match event {
            Event::Done => {
                self.done = true;
                None
            }
            Event::Delta(delta) => Some(Ok(delta)),
            Event::Error(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

enum Event {
    Delta(ModelDelta),
    Done,
    Error(BlogsmithError),
}

/// Pull the next `data:` event out of the buffer.
///
/// With `at_eof` the remaining bytes are treated as a complete line.
fn next_event(buffer: &mut Vec<u8>, at_eof: bool) -> Option<Event> {
    loop {
        let line: Vec<u8> = match buffer.iter().position(|b| *b == b'\n') {
            Some(pos) => buffer.drain(..=pos).collect(),
            None if at_eof && !buffer.is_empty() => std::mem::take(buffer),
            None => return None,
        };

        let line = match std::str::from_utf8(&line) {
            Ok(line) => line.trim(),
            Err(e) => {
                return Some(Event::Error(BlogsmithError::parse(format!(
                    "invalid UTF-8 in model stream: {e}"
                ))));
            }
        };

        // Blank separators, comments, and `event:`/`id:`/`retry:` fields
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Some(Event::Done);
        }

        return Some(parse_data(data));
    }
}

fn parse_data(data: &str) -> Event {
    let raw: StreamChunkRaw = match serde_json::from_str(data) {
        Ok(raw) => raw,
        Err(e) => {
            return Event::Error(BlogsmithError::parse(format!(
                "failed to parse stream chunk: {e} (data: {})",
                truncate_chars(data, 200)
            )));
        }
    };

    if let Some(err) = raw.error {
        return Event::Error(BlogsmithError::Model(err.message));
    }

    let Some(delta) = raw.choices.into_iter().next().and_then(|c| c.delta) else {
        return Event::Delta(ModelDelta::default());
    };

    let sources: BTreeSet<String> = delta
        .annotations
        .into_iter()
        .filter(|a| a.kind == "url_citation")
        .filter_map(|a| a.url_citation)
        .map(|c| c.url)
        .collect();

    Event::Delta(ModelDelta {
        content: delta.content.unwrap_or_default(),
        sources: (!sources.is_empty()).then_some(sources),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn sse(parts: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send {
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        futures::stream::iter(chunks)
    }

    async fn collect(parts: &[&str]) -> Vec<Result<ModelDelta>> {
        DeltaStream::new(sse(parts)).collect().await
    }

    #[tokio::test]
    async fn parses_tokens_until_done() {
        let deltas = collect(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ])
        .await;

        let content: Vec<String> = deltas.into_iter().map(|d| d.unwrap().content).collect();
        assert_eq!(content, vec!["", "Hello", " world"]);
    }

    #[tokio::test]
    async fn lines_split_across_chunks() {
        // One event split across two network chunks
        let deltas = collect(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"caf",
            "\u{e9}\"}}]}\n\ndata: [DONE]\n",
        ])
        .await;

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].as_ref().unwrap().content, "café");
    }

    #[tokio::test]
    async fn multibyte_char_split_at_byte_level() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"é\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::copy_from_slice(&line[..split])),
            Ok(Bytes::copy_from_slice(&line[split..])),
        ];

        let deltas: Vec<_> = DeltaStream::new(futures::stream::iter(chunks)).collect().await;
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].as_ref().unwrap().content, "é");
    }

    #[tokio::test]
    async fn url_citations_become_sources() {
        let deltas = collect(&[concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Cited.\",\"annotations\":[",
            "{\"type\":\"url_citation\",\"url_citation\":{\"url\":\"https://news.example.com/b\",\"title\":\"B\"}},",
            "{\"type\":\"url_citation\",\"url_citation\":{\"url\":\"https://news.example.com/a\"}},",
            "{\"type\":\"file_citation\"}",
            "]}}]}\n"
        )])
        .await;

        let delta = deltas[0].as_ref().unwrap();
        let sources: Vec<&str> = delta
            .sources
            .as_ref()
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(sources, vec!["https://news.example.com/a", "https://news.example.com/b"]);
    }

    #[tokio::test]
    async fn skips_comments_and_event_fields() {
        let deltas = collect(&[
            ": OPENROUTER PROCESSING\n\n",
            "event: message\nid: 1\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
        ])
        .await;

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].as_ref().unwrap().content, "x");
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_parsed() {
        let deltas = collect(&["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]).await;
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].as_ref().unwrap().content, "tail");
    }

    #[tokio::test]
    async fn error_event_ends_stream() {
        let deltas = collect(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
            "data: {\"error\":{\"message\":\"upstream overloaded\",\"code\":502}}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n",
        ])
        .await;

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].as_ref().unwrap().content, "partial");
        let err = deltas[1].as_ref().unwrap_err();
        assert!(matches!(err, BlogsmithError::Model(m) if m == "upstream overloaded"));
    }

    #[tokio::test]
    async fn garbage_data_is_a_parse_error() {
        let deltas = collect(&["data: {not json\n"]).await;
        assert_eq!(deltas.len(), 1);
        assert!(matches!(deltas[0], Err(BlogsmithError::Parse { .. })));
    }
}
