//! Core pipeline orchestration for Blogsmith.
//!
//! This crate ties together query planning, news search, article scraping,
//! and the writer model into one streaming run ([`Pipeline::run`]).

pub mod document;
pub mod pipeline;
pub mod planner;
pub mod scrape;
pub mod writer;

#[cfg(test)]
mod testing;

pub use document::DocumentBuilder;
pub use pipeline::{
    ChunkStream, EMPTY_TOPIC_MESSAGE, GenerationFailed, Pipeline, PipelineSettings,
    ProgressReporter, SilentProgress, WRITER_FAILED_MESSAGE,
};
pub use planner::{plan_query, should_plan};
pub use scrape::{ArticleScraper, ScrapeOutcome, ScrapedArticles};
pub use writer::{WriterRequest, synthesize};
