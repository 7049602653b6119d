//! In-crate fakes for the search, extraction, and model collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blogsmith_extract::{Extracted, Extractor};
use blogsmith_llm::{LanguageModel, ModelDelta, ModelRequest, ModelStream};
use blogsmith_search::SearchBackend;
use blogsmith_shared::{BlogsmithError, Result, SearchResult};
use futures::StreamExt;
use url::Url;

pub(crate) fn result(id: &str) -> SearchResult {
    SearchResult {
        title: format!("Story {id}"),
        url: format!("https://news.example.com/{id}"),
        summary: Some(format!("Summary {id}")),
        published_at: None,
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

pub(crate) struct FakeSearch {
    results: Option<Vec<SearchResult>>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn returning(results: Vec<SearchResult>) -> Self {
        Self {
            results: Some(results),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            results: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.results {
            Some(results) => Ok(results.iter().take(max_results).cloned().collect()),
            None => Err(BlogsmithError::Network("feed unreachable".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeExtractor {
    pages: HashMap<String, Extracted>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeExtractor {
    /// Every URL fails to extract.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, title: Option<&str>, text: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Extracted {
                title: title.map(str::to_string),
                text: text.to_string(),
            },
        );
        self
    }

    pub fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `extract` calls seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, url: &Url) -> Result<Extracted> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(url.as_str())
            .copied()
            .unwrap_or(Duration::from_millis(10));
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| BlogsmithError::Network(format!("{url}: connection refused")))
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

enum StreamScript {
    Deltas(Vec<std::result::Result<ModelDelta, String>>),
    Refuse,
    Endless,
}

pub(crate) struct FakeModel {
    reply: Option<String>,
    script: StreamScript,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    /// Deltas handed out by the endless stream.
    produced: Arc<AtomicUsize>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl FakeModel {
    fn new(reply: Option<String>, script: StreamScript) -> Self {
        Self {
            reply,
            script,
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            produced: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::new(
            Some(reply.to_string()),
            StreamScript::Deltas(vec![Ok(ModelDelta::text(reply))]),
        )
    }

    pub fn failing() -> Self {
        Self::new(None, StreamScript::Refuse)
    }

    pub fn streaming(deltas: Vec<ModelDelta>) -> Self {
        Self::new(None, StreamScript::Deltas(deltas.into_iter().map(Ok).collect()))
    }

    /// Streams `deltas`, then fails mid-stream.
    pub fn breaking_after(deltas: Vec<ModelDelta>) -> Self {
        let mut script: Vec<_> = deltas.into_iter().map(Ok).collect();
        script.push(Err("connection reset by peer".to_string()));
        Self::new(None, StreamScript::Deltas(script))
    }

    pub fn endless() -> Self {
        Self::new(None, StreamScript::Endless)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ModelRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.reply
            .clone()
            .ok_or_else(|| BlogsmithError::Model("model unavailable".into()))
    }

    async fn stream(&self, request: &ModelRequest) -> Result<ModelStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match &self.script {
            StreamScript::Refuse => Err(BlogsmithError::Model("model unavailable".into())),
            StreamScript::Deltas(script) => {
                let items: Vec<Result<ModelDelta>> = script
                    .iter()
                    .map(|item| item.clone().map_err(BlogsmithError::Model))
                    .collect();
                Ok(futures::stream::iter(items).boxed())
            }
            StreamScript::Endless => {
                let produced = Arc::clone(&self.produced);
                Ok(futures::stream::unfold(produced, |produced| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    let n = produced.fetch_add(1, Ordering::SeqCst);
                    Some((Ok::<_, BlogsmithError>(ModelDelta::text(format!("token{n} "))), produced))
                })
                .boxed())
            }
        }
    }
}
