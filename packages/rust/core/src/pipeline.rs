//! End-to-end generation pipeline: topic → plan → search → scrape → write.
//!
//! A run executes on its own task and hands chunks to the caller through a
//! bounded channel. Dropping the [`ChunkStream`] cancels the run.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use blogsmith_extract::Extractor;
use blogsmith_llm::LanguageModel;
use blogsmith_search::{SearchBackend, get_search_results};
use blogsmith_shared::{AppConfig, GeneratedChunk, RunId, sanitize};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::planner::plan_query;
use crate::scrape::{ArticleScraper, ScrapedArticles};
use crate::writer::{WriterRequest, synthesize};

/// Reply for a topic that is empty after sanitizing.
pub const EMPTY_TOPIC_MESSAGE: &str = "Please provide a topic or some ideas to get started.";

/// User-facing message when the writer fails.
pub const WRITER_FAILED_MESSAGE: &str =
    "The writer model failed to produce the post. Please try again.";

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each article finishes scraping.
    fn article_scraped(&self, url: &str, current: usize, total: usize);
    /// Called once the writer starts producing the post.
    fn writing(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn article_scraped(&self, _url: &str, _current: usize, _total: usize) {}
    fn writing(&self) {}
}

// ---------------------------------------------------------------------------
// Output stream
// ---------------------------------------------------------------------------

/// Terminal failure of a run, with a message safe to show to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct GenerationFailed {
    pub message: String,
}

impl GenerationFailed {
    fn writer() -> Self {
        Self {
            message: WRITER_FAILED_MESSAGE.into(),
        }
    }
}

type ChunkItem = Result<GeneratedChunk, GenerationFailed>;

/// Ordered chunks of one run.
///
/// The run stays at most one chunk ahead of the reader. Dropping the stream
/// aborts the run.
pub struct ChunkStream {
    run_id: RunId,
    rx: mpsc::Receiver<ChunkItem>,
    task: JoinHandle<()>,
}

impl ChunkStream {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }
}

impl Stream for ChunkStream {
    type Item = ChunkItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Limits and switches for a run, taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_results: usize,
    pub search_attempts: u32,
    pub topic_max_chars: usize,
    pub guidelines_max_chars: usize,
    pub query_planner: bool,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_results: config.search.max_results,
            search_attempts: config.search.attempts,
            topic_max_chars: config.generation.topic_max_chars,
            guidelines_max_chars: config.generation.guidelines_max_chars,
            query_planner: config.generation.query_planner,
        }
    }
}

/// The blog post generator.
#[derive(Clone)]
pub struct Pipeline {
    search: Arc<dyn SearchBackend>,
    scraper: ArticleScraper,
    model: Arc<dyn LanguageModel>,
    settings: PipelineSettings,
    progress: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(
        search: Arc<dyn SearchBackend>,
        extractor: Arc<dyn Extractor>,
        model: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Self {
        Self {
            search,
            scraper: ArticleScraper::new(extractor, &config.scrape),
            model,
            settings: PipelineSettings::from(config),
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings_mut(&mut self) -> &mut PipelineSettings {
        &mut self.settings
    }

    /// Start a run. Must be called from within a Tokio runtime.
    pub fn run(
        &self,
        topic: &str,
        style_guidelines: Option<&str>,
        include_sources: bool,
    ) -> ChunkStream {
        let run_id = RunId::new();
        let (tx, rx) = mpsc::channel(1);

        let pipeline = self.clone();
        let topic = topic.to_string();
        let style_guidelines = style_guidelines.map(str::to_string);
        let span = info_span!("generate", run_id = %run_id);

        let task = tokio::spawn(
            async move {
                pipeline
                    .execute(&topic, style_guidelines.as_deref(), include_sources, tx)
                    .await;
            }
            .instrument(span),
        );

        ChunkStream { run_id, rx, task }
    }

    async fn execute(
        &self,
        topic: &str,
        style_guidelines: Option<&str>,
        include_sources: bool,
        tx: mpsc::Sender<ChunkItem>,
    ) {
        let start = Instant::now();

        // --- Validate ---
        let cleaned_topic = sanitize(Some(topic), self.settings.topic_max_chars);
        if cleaned_topic.is_empty() {
            info!("empty topic, nothing to do");
            let _ = tx.send(Ok(GeneratedChunk::text(EMPTY_TOPIC_MESSAGE))).await;
            return;
        }
        let guidelines = sanitize(style_guidelines, self.settings.guidelines_max_chars);
        info!(topic = %cleaned_topic, "generating a blog post");

        // --- Plan ---
        let query = if self.settings.query_planner {
            self.progress.phase("Planning search query");
            plan_query(self.model.as_ref(), topic, &cleaned_topic, &guidelines).await
        } else {
            cleaned_topic.clone()
        };

        // --- Search ---
        self.progress.phase("Searching news");
        let results = get_search_results(
            self.search.as_ref(),
            &query,
            self.settings.max_results,
            self.settings.search_attempts,
        )
        .await
        .filter(|results| !results.is_empty());

        let Some(results) = results else {
            let message = format!("Sorry, could not find any articles on the topic: {cleaned_topic}");
            let _ = tx.send(Ok(GeneratedChunk::text(message))).await;
            return;
        };

        // --- Scrape ---
        self.progress.phase("Scraping articles");
        let mut scraped = self.scraper.scrape_all(&results, self.progress.as_ref()).await;
        if scraped.is_empty() {
            warn!("no articles scraped successfully, falling back to feed summaries only");
            scraped = ScrapedArticles::placeholders(&results);
        }

        // --- Write ---
        self.progress.writing();
        let request = WriterRequest {
            topic: cleaned_topic,
            style_guidelines: guidelines,
            include_sources,
            articles: scraped.into_vec(),
        };

        let mut chunks = match synthesize(self.model.as_ref(), &request).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!(error = %e, "writer failed to start");
                let _ = tx.send(Err(GenerationFailed::writer())).await;
                return;
            }
        };

        // A channel slot is claimed before the writer is polled, so at most
        // one chunk waits unread in the channel.
        let mut sent = 0usize;
        loop {
            let Ok(permit) = tx.reserve().await else {
                debug!(sent, "consumer went away, stopping run");
                return;
            };
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    permit.send(Ok(chunk));
                    sent += 1;
                }
                Some(Err(e)) => {
                    error!(error = %e, sent, "writer stream failed");
                    permit.send(Err(GenerationFailed::writer()));
                    return;
                }
                None => break,
            }
        }

        info!(
            chunks = sent,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "blog post generated"
        );
    }
}
