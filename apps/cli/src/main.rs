//! Blogsmith CLI — researched blog posts from a topic.
//!
//! Searches recent news, reads the articles, and streams a Markdown post
//! written by a language model.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
