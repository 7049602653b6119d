//! News search: feed client, feed parsing, and the retrying search wrapper.
//!
//! The default backend queries the Google News RSS endpoint. Any other
//! source can be plugged in through [`SearchBackend`].

mod parser;

use std::time::Duration;

use async_trait::async_trait;
use blogsmith_shared::{BlogsmithError, Result, SearchConfig, SearchResult};
use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, error, info, instrument, warn};

/// Upper bound for the delay between two search attempts.
const MAX_BACKOFF_SECS: u64 = 5;

/// Maximum feed size we are willing to read (5 MB).
const MAX_FEED_SIZE: usize = 5 * 1024 * 1024;

// ---------------------------------------------------------------------------
// SearchBackend
// ---------------------------------------------------------------------------

/// A source of candidate articles for a query.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Return up to `max_results` unique articles, in source order.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

// ---------------------------------------------------------------------------
// NewsFeedSearch
// ---------------------------------------------------------------------------

/// RSS search client for a templated feed endpoint.
pub struct NewsFeedSearch {
    client: Client,
    endpoint: String,
}

impl NewsFeedSearch {
    /// Build a client from the `[search]` config section.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        if !config.endpoint.contains("{query}") {
            return Err(BlogsmithError::config(
                "search endpoint must contain a {query} placeholder",
            ));
        }

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                BlogsmithError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// The feed URL for `query` (form-encoded, spaces as `+`).
    pub fn feed_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.endpoint.replace("{query}", &encoded)
    }
}

#[async_trait]
impl SearchBackend for NewsFeedSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let url = self.feed_url(query);
        debug!(%url, "fetching news feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BlogsmithError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlogsmithError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_FEED_SIZE as u64 {
                return Err(feed_too_large(&url));
            }
        }

        let body = read_feed_body(response, &url).await?;

        Ok(parser::parse_feed(&body, max_results))
    }
}

fn feed_too_large(url: &str) -> BlogsmithError {
    BlogsmithError::validation(format!("{url}: feed too large (max {MAX_FEED_SIZE} bytes)"))
}

/// Read the body incrementally, giving up once it passes [`MAX_FEED_SIZE`].
///
/// Chunked responses carry no `Content-Length`, so the cap is enforced here.
async fn read_feed_body(response: reqwest::Response, url: &str) -> Result<String> {
    let mut body: Vec<u8> = Vec::new();
    let mut chunks = response.bytes_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk
            .map_err(|e| BlogsmithError::Network(format!("{url}: failed to read body: {e}")))?;
        if body.len() + chunk.len() > MAX_FEED_SIZE {
            return Err(feed_too_large(url));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

// ---------------------------------------------------------------------------
// Retry wrapper
// ---------------------------------------------------------------------------

/// Delay after failed attempt number `attempt` (1-based): `min(2 × attempt, 5)` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs((2 * u64::from(attempt)).min(MAX_BACKOFF_SECS))
}

/// Search with bounded retries.
///
/// Calls the backend at most `num_attempts` times and returns the first
/// non-empty result. An attempt that errors or finds nothing is followed by
/// [`backoff_delay`] before the next one; there is no delay after the last
/// attempt. Returns `None` when every attempt failed.
#[instrument(skip(backend))]
pub async fn get_search_results(
    backend: &dyn SearchBackend,
    query: &str,
    max_results: usize,
    num_attempts: u32,
) -> Option<Vec<SearchResult>> {
    for attempt in 1..=num_attempts {
        match backend.search(query, max_results).await {
            Ok(results) if !results.is_empty() => {
                info!(count = results.len(), attempt, "found articles");
                return Some(results);
            }
            Ok(_) => {
                warn!(attempt, num_attempts, "search attempt failed: no articles found");
            }
            Err(e) => {
                warn!(attempt, num_attempts, error = %e, "search attempt failed");
            }
        }

        if attempt < num_attempts {
            let delay = backoff_delay(attempt);
            debug!(delay_secs = delay.as_secs(), "backing off before next search attempt");
            tokio::time::sleep(delay).await;
        }
    }

    error!(num_attempts, "failed to get search results");
    None
}
