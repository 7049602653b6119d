//! Application configuration for Blogsmith.
//!
//! User config lives at `~/.blogsmith/blogsmith.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BlogsmithError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "blogsmith.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".blogsmith";

/// Google News RSS search endpoint. `{query}` is replaced with the form-encoded query.
pub const DEFAULT_SEARCH_ENDPOINT: &str =
    "https://news.google.com/rss/search?q={query}&hl=en-US&gl=US&ceid=US:en";

// ---------------------------------------------------------------------------
// Config structs (matching blogsmith.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language-model provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// News search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Article scraping settings.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Input limits and pipeline switches.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Supported chat-completion providers. All are reached through their
/// OpenAI-compatible endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Gemini,
    Anthropic,
    Xai,
    #[default]
    OpenRouter,
}

impl LlmProvider {
    /// Model used when neither the config file nor the CLI names one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Gemini => "gemini-2.0-flash",
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::Xai => "grok-beta",
            Self::OpenRouter => "moonshotai/kimi-k2.5",
        }
    }

    /// OpenAI-compatible API root for this provider.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Xai => "https://api.x.ai/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Name of the env var conventionally holding this provider's API key.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Xai => "XAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::Xai => "xai",
            Self::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = BlogsmithError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "xai" | "grok" => Ok(Self::Xai),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(BlogsmithError::config(format!(
                "unsupported provider '{other}': expected openai, gemini, anthropic, xai, or openrouter"
            ))),
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which provider to talk to.
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model override (defaults to the provider's default model).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// API root override (proxies, self-hosted gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout for model calls, in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            api_key_env: None,
            base_url: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    120
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Feed URL template containing a `{query}` placeholder.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum number of articles accepted from one feed.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Number of search attempts before giving up.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Feed request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// User-Agent header sent with feed requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_results: default_max_results(),
            attempts: default_attempts(),
            timeout_secs: default_search_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_SEARCH_ENDPOINT.into()
}
fn default_max_results() -> usize {
    10
}
fn default_attempts() -> u32 {
    3
}
fn default_search_timeout() -> u64 {
    10
}
fn default_user_agent() -> String {
    concat!("Mozilla/5.0 (compatible; Blogsmith/", env!("CARGO_PKG_VERSION"), ")").into()
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Maximum concurrent article fetches.
    #[serde(default = "default_scrape_concurrency")]
    pub concurrency: usize,

    /// Per-article fetch timeout in seconds.
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Extracted text longer than this is truncated before synthesis.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_scrape_concurrency(),
            timeout_secs: default_scrape_timeout(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_scrape_concurrency() -> usize {
    4
}
fn default_scrape_timeout() -> u64 {
    30
}
fn default_max_content_chars() -> usize {
    12_000
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sanitized topic length cap.
    #[serde(default = "default_topic_max")]
    pub topic_max_chars: usize,

    /// Sanitized style-guidelines length cap.
    #[serde(default = "default_guidelines_max")]
    pub guidelines_max_chars: usize,

    /// Whether verbose topics may be rewritten into a search query by the model.
    #[serde(default = "default_true")]
    pub query_planner: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            topic_max_chars: default_topic_max(),
            guidelines_max_chars: default_guidelines_max(),
            query_planner: true,
        }
    }
}

fn default_topic_max() -> usize {
    600
}
fn default_guidelines_max() -> usize {
    1500
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Resolved model settings (runtime, merged from config + env)
// ---------------------------------------------------------------------------

/// Everything a chat client needs, with provider defaults applied and the
/// API key read from the environment.
#[derive(Clone)]
pub struct ModelSettings {
    pub provider: LlmProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmConfig {
    /// Effective env var name for the API key.
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    /// Effective model name.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Apply provider defaults and read the API key from the environment.
    pub fn resolve(&self) -> Result<ModelSettings> {
        let var_name = self.api_key_env();
        let api_key = match std::env::var(var_name) {
            Ok(val) if !val.trim().is_empty() => val,
            _ => {
                return Err(BlogsmithError::config(format!(
                    "{} API key not found. Set the {var_name} environment variable.",
                    self.provider
                )));
            }
        };

        Ok(ModelSettings {
            provider: self.provider,
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| self.provider.default_base_url().to_string()),
            model: self.model().to_string(),
            api_key,
            timeout_secs: self.timeout_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.blogsmith/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BlogsmithError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.blogsmith/blogsmith.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BlogsmithError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        BlogsmithError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    if !config.search.endpoint.contains("{query}") {
        return Err(BlogsmithError::config(format!(
            "search.endpoint in {} must contain a {{query}} placeholder",
            path.display()
        )));
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BlogsmithError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BlogsmithError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BlogsmithError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
