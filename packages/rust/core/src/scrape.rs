//! Article scraping: turn search results into [`ScrapedArticle`] records.
//!
//! Each article is scraped independently on a bounded worker pool. A failed
//! extraction keeps the article (without content); only URLs that cannot be
//! fetched at all are dropped.

use std::collections::HashSet;
use std::sync::Arc;

use blogsmith_extract::{Extractor, check_target};
use blogsmith_shared::{ScrapeConfig, ScrapedArticle, SearchResult, truncate_chars};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// ScrapeOutcome
// ---------------------------------------------------------------------------

/// Result of scraping one search result.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    /// The page was requested. `content` is `None` when extraction failed
    /// or found no readable text.
    Scraped(ScrapedArticle),
    /// The article could not be scraped at all (bad URL, non-HTTP scheme,
    /// private target).
    Rejected(String),
}

// ---------------------------------------------------------------------------
// ScrapedArticles
// ---------------------------------------------------------------------------

/// Scraped articles keyed by URL, in insertion order. First write wins.
#[derive(Debug, Clone, Default)]
pub struct ScrapedArticles {
    articles: Vec<ScrapedArticle>,
    urls: HashSet<String>,
}

impl ScrapedArticles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary-only entries for every search result.
    pub fn placeholders(results: &[SearchResult]) -> Self {
        let mut map = Self::new();
        for result in results {
            map.insert(ScrapedArticle::placeholder(result));
        }
        map
    }

    /// Insert an article unless its URL is already present.
    pub fn insert(&mut self, article: ScrapedArticle) -> bool {
        if !self.urls.insert(article.url.clone()) {
            return false;
        }
        self.articles.push(article);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn get(&self, url: &str) -> Option<&ScrapedArticle> {
        self.articles.iter().find(|a| a.url == url)
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScrapedArticle> {
        self.articles.iter()
    }

    pub fn into_vec(self) -> Vec<ScrapedArticle> {
        self.articles
    }
}

// ---------------------------------------------------------------------------
// ArticleScraper
// ---------------------------------------------------------------------------

/// Scrapes articles through an [`Extractor`].
#[derive(Clone)]
pub struct ArticleScraper {
    extractor: Arc<dyn Extractor>,
    concurrency: usize,
    max_content_chars: usize,
}

impl ArticleScraper {
    pub fn new(extractor: Arc<dyn Extractor>, config: &ScrapeConfig) -> Self {
        Self {
            extractor,
            concurrency: config.concurrency.max(1),
            max_content_chars: config.max_content_chars,
        }
    }

    /// Scrape a single article.
    #[instrument(skip_all, fields(url = %article.url))]
    pub async fn scrape(&self, article: &SearchResult) -> ScrapeOutcome {
        let url = match check_target(&article.url) {
            Ok(url) => url,
            Err(e) => return ScrapeOutcome::Rejected(e.to_string()),
        };

        let mut scraped = ScrapedArticle::placeholder(article);

        match self.extractor.extract(&url).await {
            Ok(extracted) => {
                if let Some(title) = extracted.title.filter(|t| !t.trim().is_empty()) {
                    scraped.title = title;
                }
                let text = extracted.text.trim();
                if !text.is_empty() {
                    scraped.content = Some(truncate_chars(text, self.max_content_chars).to_string());
                }
            }
            Err(e) => {
                scraped.error = Some(e.to_string());
            }
        }

        ScrapeOutcome::Scraped(scraped)
    }

    /// Scrape every result on the worker pool.
    ///
    /// The returned map is in input order; duplicate URLs are scraped once.
    /// Dropping the future aborts every queued and in-flight scrape.
    #[instrument(skip_all, fields(count = results.len(), concurrency = self.concurrency))]
    pub async fn scrape_all(
        &self,
        results: &[SearchResult],
        progress: &dyn ProgressReporter,
    ) -> ScrapedArticles {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut seen: HashSet<&str> = HashSet::new();
        let mut urls: Vec<String> = Vec::new();
        let mut tasks = JoinSet::new();

        for article in results {
            if !seen.insert(article.url.as_str()) {
                debug!(url = %article.url, "duplicate article skipped");
                continue;
            }

            let index = urls.len();
            urls.push(article.url.clone());

            let scraper = self.clone();
            let sem = Arc::clone(&semaphore);
            let article = article.clone();

            tasks.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return (index, ScrapeOutcome::Rejected("worker pool closed".into()));
                };
                (index, scraper.scrape(&article).await)
            });
        }

        let total = urls.len();
        let mut outcomes: Vec<Option<ScrapeOutcome>> = vec![None; total];
        let mut finished = 0usize;

        while let Some(joined) = tasks.join_next().await {
            finished += 1;
            match joined {
                Ok((index, outcome)) => {
                    progress.article_scraped(&urls[index], finished, total);
                    outcomes[index] = Some(outcome);
                }
                Err(e) => {
                    warn!(error = %e, "scrape task failed");
                }
            }
        }

        let mut scraped = ScrapedArticles::new();
        for (url, outcome) in urls.iter().zip(outcomes) {
            match outcome {
                Some(ScrapeOutcome::Scraped(article)) => {
                    if let Some(err) = &article.error {
                        warn!(%url, error = %err, "no readable content found for article");
                    } else if !article.has_content() {
                        warn!(%url, "no readable content found for article");
                    } else {
                        info!(%url, "scraped article");
                    }
                    scraped.insert(article);
                }
                Some(ScrapeOutcome::Rejected(reason)) => {
                    warn!(%url, %reason, "skipping article due to scrape failure");
                }
                None => {}
            }
        }

        info!(scraped = scraped.len(), total, "scraping complete");
        scraped
    }
}
