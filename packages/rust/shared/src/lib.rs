//! Shared types, error model, configuration, and text sanitation for Blogsmith.
//!
//! This crate is the foundation depended on by all other Blogsmith crates.
//! It provides:
//! - [`BlogsmithError`] — the unified error type
//! - Domain types ([`SearchResult`], [`ScrapedArticle`], [`GeneratedChunk`], [`RunId`])
//! - Configuration ([`AppConfig`], [`ModelSettings`], config loading)
//! - [`sanitize`] for untrusted free text

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_SEARCH_ENDPOINT, GenerationConfig, LlmConfig, LlmProvider, ModelSettings,
    ScrapeConfig, SearchConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{BlogsmithError, Result};
pub use text::{sanitize, truncate_chars};
pub use types::{GeneratedChunk, RunId, ScrapedArticle, SearchResult};
