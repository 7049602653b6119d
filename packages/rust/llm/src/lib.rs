//! Language-model access for Blogsmith.
//!
//! Every supported provider is reached through its OpenAI-compatible chat
//! completions endpoint, so one client covers them all. The pipeline only
//! sees the [`LanguageModel`] trait.

mod streaming;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use blogsmith_shared::{BlogsmithError, ModelSettings, Result, truncate_chars};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

pub use streaming::DeltaStream;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A single-turn request: one system message and one user message.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
    pub temperature: Option<f32>,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// One streamed increment of model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDelta {
    /// Text delta, possibly empty.
    pub content: String,
    /// URLs cited by this delta (`url_citation` annotations).
    pub sources: Option<BTreeSet<String>>,
}

impl ModelDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sources: None,
        }
    }

    /// True when the delta carries neither text nor sources.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.sources.as_ref().is_none_or(BTreeSet::is_empty)
    }
}

/// Stream of deltas from one streamed completion.
pub type ModelStream = BoxStream<'static, Result<ModelDelta>>;

// ---------------------------------------------------------------------------
// LanguageModel
// ---------------------------------------------------------------------------

/// The model capability used by the query planner and the writer.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a completion and return the whole reply.
    async fn complete(&self, request: &ModelRequest) -> Result<String>;

    /// Start a streamed completion.
    async fn stream(&self, request: &ModelRequest) -> Result<ModelStream>;
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client for any OpenAI-compatible endpoint.
pub struct ChatClient {
    http: Client,
    settings: ModelSettings,
}

impl ChatClient {
    /// Build a client from resolved model settings.
    ///
    /// `timeout_secs` bounds connecting and each read, so a stalled call
    /// fails while a stream that keeps producing deltas runs to the end.
    /// Non-streamed completions are also capped as a whole.
    pub fn new(settings: ModelSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let http = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| {
                BlogsmithError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { http, settings })
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    async fn post(&self, request: &ModelRequest, stream: bool) -> Result<reqwest::Response> {
        let body = WireRequest {
            model: &self.settings.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            stream,
        };

        let mut builder = self
            .http
            .post(self.endpoint())
            .header(AUTHORIZATION, format!("Bearer {}", self.settings.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        if !stream {
            builder = builder.timeout(Duration::from_secs(self.settings.timeout_secs));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "model request failed");
                BlogsmithError::Network(format!("{}: {e}", self.settings.provider))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, error = %truncate_chars(&error_text, 500), "model API error");
            return Err(BlogsmithError::Model(format!(
                "{} returned HTTP {status}",
                self.settings.provider
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    #[instrument(skip_all, fields(provider = %self.settings.provider, model = %self.settings.model))]
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        let start = Instant::now();
        let response = self.post(request, false).await?;

        let reply: WireResponse = response
            .json()
            .await
            .map_err(|e| BlogsmithError::parse(format!("invalid completion response: {e}")))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BlogsmithError::Model("completion has no content".into()))?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "chat completion finished"
        );
        Ok(content)
    }

    #[instrument(skip_all, fields(provider = %self.settings.provider, model = %self.settings.model))]
    async fn stream(&self, request: &ModelRequest) -> Result<ModelStream> {
        let response = self.post(request, true).await?;
        debug!("streaming chat completion started");
        Ok(DeltaStream::new(response.bytes_stream()).boxed())
    }
}
