//! Article content extraction.
//!
//! This crate provides:
//! - [`Extractor`] — the extraction capability used by the scrape stage
//! - [`HttpExtractor`] — fetches a page and applies readability heuristics,
//!   rendering the article body as Markdown text
//! - [`check_target`] — URL validation and SSRF protection

mod readability;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use blogsmith_shared::{BlogsmithError, Result, ScrapeConfig};
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};
use url::Url;

/// User-Agent string for article requests.
const USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; Blogsmith/", env!("CARGO_PKG_VERSION"), ")");

/// Maximum page size we are willing to read (10 MB).
const MAX_PAGE_SIZE: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Readable content of one article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Page title, if one could be found.
    pub title: Option<String>,
    /// Body text (Markdown). May be empty.
    pub text: String,
}

/// Turns an article URL into its title and readable text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &Url) -> Result<Extracted>;
}

// ---------------------------------------------------------------------------
// HttpExtractor
// ---------------------------------------------------------------------------

/// Fetches pages over HTTP and extracts their article body.
pub struct HttpExtractor {
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl HttpExtractor {
    /// Create an extractor using the `[scrape]` timeout.
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                BlogsmithError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    #[instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &Url) -> Result<Extracted> {
        if !self.allow_localhost && is_ssrf_target(url) {
            return Err(BlogsmithError::validation(format!(
                "{url}: refusing to fetch private or non-HTTP target"
            )));
        }

        debug!("fetching article");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| BlogsmithError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlogsmithError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !content_type.contains("html") {
                return Err(BlogsmithError::Extraction(format!(
                    "{url}: unsupported content type {content_type}"
                )));
            }
        }

        if let Some(len) = response.content_length() {
            if len > MAX_PAGE_SIZE as u64 {
                return Err(page_too_large(url));
            }
        }

        // No Content-Length on chunked pages; cap while reading
        let mut bytes: Vec<u8> = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk
                .map_err(|e| BlogsmithError::Network(format!("{url}: body read failed: {e}")))?;
            if bytes.len() + chunk.len() > MAX_PAGE_SIZE {
                return Err(page_too_large(url));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);

        let readable = readability::extract_readable(&body)?;

        Ok(Extracted {
            title: readable.title,
            text: readable.text,
        })
    }
}

fn page_too_large(url: &Url) -> BlogsmithError {
    BlogsmithError::Extraction(format!("{url}: page too large (max {MAX_PAGE_SIZE} bytes)"))
}

// ---------------------------------------------------------------------------
// Target validation / SSRF protection
// ---------------------------------------------------------------------------

/// Parse an article URL and refuse anything that is not a public HTTP(S) target.
pub fn check_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| BlogsmithError::validation(format!("invalid article URL '{raw}': {e}")))?;

    if is_ssrf_target(&url) {
        return Err(BlogsmithError::validation(format!(
            "{url}: private or non-HTTP target"
        )));
    }

    Ok(url)
}

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link local)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
