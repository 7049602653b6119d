//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::sync::Arc;

use blogsmith_core::{DocumentBuilder, Pipeline, ProgressReporter};
use blogsmith_extract::HttpExtractor;
use blogsmith_llm::ChatClient;
use blogsmith_search::NewsFeedSearch;
use blogsmith_shared::{AppConfig, LlmProvider, init_config, load_config};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Blogsmith — researched blog posts from a topic.
#[derive(Parser)]
#[command(
    name = "blogsmith",
    version,
    about = "Generate a researched blog post from recent news on a topic.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Research a topic and stream a blog post to stdout.
    Generate {
        /// Topic or rough ideas for the post.
        topic: String,

        /// Style guidelines (tone, audience, length).
        #[arg(short, long)]
        style: Option<String>,

        /// Append a sources section.
        #[arg(long)]
        sources: bool,

        /// Model provider: openai, gemini, anthropic, xai, or openrouter.
        #[arg(long, env = "BLOGSMITH_PROVIDER")]
        provider: Option<String>,

        /// Model identifier (defaults to the provider's default).
        #[arg(long, env = "BLOGSMITH_MODEL")]
        model: Option<String>,

        /// Search with the topic as-is, never asking the model for a query.
        #[arg(long)]
        no_planner: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries the post.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "blogsmith=info",
        1 => "blogsmith=debug",
        _ => "blogsmith=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            topic,
            style,
            sources,
            provider,
            model,
            no_planner,
        } => {
            let overrides = Overrides {
                provider,
                model,
                no_planner,
            };
            cmd_generate(&topic, style.as_deref(), sources, overrides).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Command-line settings that take precedence over the config file.
struct Overrides {
    provider: Option<String>,
    model: Option<String>,
    no_planner: bool,
}

impl Overrides {
    fn apply(self, config: &mut AppConfig) -> Result<()> {
        if let Some(provider) = self.provider {
            let provider: LlmProvider = provider.parse()?;
            if provider != config.llm.provider {
                // Model, key variable, and endpoint from the file belong to the other provider
                config.llm.provider = provider;
                config.llm.model = None;
                config.llm.api_key_env = None;
                config.llm.base_url = None;
            }
        }
        if let Some(model) = self.model {
            config.llm.model = Some(model);
        }
        if self.no_planner {
            config.generation.query_planner = false;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    topic: &str,
    style: Option<&str>,
    include_sources: bool,
    overrides: Overrides,
) -> Result<()> {
    let mut config = load_config()?;
    overrides.apply(&mut config)?;

    // Fail on a missing API key before any network traffic
    let settings = config.llm.resolve()?;
    info!(provider = %settings.provider, model = %settings.model, "using model");

    let search = Arc::new(NewsFeedSearch::new(&config.search)?);
    let extractor = Arc::new(HttpExtractor::new(&config.scrape)?);
    let model = Arc::new(ChatClient::new(settings)?);

    let reporter = Arc::new(CliProgress::new());
    let pipeline =
        Pipeline::new(search, extractor, model, &config).with_progress(reporter.clone());

    let mut stream = pipeline.run(topic, style, include_sources);
    let mut doc = DocumentBuilder::new(include_sources);
    let mut stdout = std::io::stdout().lock();

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                reporter.clear();
                stdout.write_all(chunk.content.as_bytes())?;
                stdout.flush()?;
                doc.push(&chunk);
            }
            Err(failed) => {
                reporter.clear();
                writeln!(stdout)?;
                return Err(eyre!(failed));
            }
        }
    }
    reporter.clear();

    write!(stdout, "{}", doc.sources_section())?;
    writeln!(stdout)?;
    stdout.flush()?;

    info!(
        run_id = %stream.run_id(),
        chars = doc.content().chars().count(),
        sources = doc.sources().len(),
        "post complete"
    );
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn article_scraped(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Scraping [{current}/{total}] {url}"));
    }

    fn writing(&self) {
        self.spinner.set_message("Writing post");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "blogsmith",
            "-v",
            "generate",
            "AI in healthcare",
            "--style",
            "casual",
            "--sources",
            "--provider",
            "openai",
            "--no-planner",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Generate {
                topic,
                style,
                sources,
                provider,
                no_planner,
                ..
            } => {
                assert_eq!(topic, "AI in healthcare");
                assert_eq!(style.as_deref(), Some("casual"));
                assert!(sources);
                assert_eq!(provider.as_deref(), Some("openai"));
                assert!(no_planner);
            }
            Command::Config { .. } => panic!("expected generate"),
        }
    }

    #[test]
    fn switching_provider_drops_file_model() {
        let mut config = AppConfig::default();
        config.llm.model = Some("moonshotai/kimi-k2.5".into());
        config.llm.base_url = Some("https://openrouter.ai/api/v1".into());

        Overrides {
            provider: Some("openai".into()),
            model: None,
            no_planner: true,
        }
        .apply(&mut config)
        .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model(), "gpt-4o");
        assert_eq!(config.llm.base_url, None);
        assert!(!config.generation.query_planner);
    }

    #[test]
    fn model_flag_wins_over_file() {
        let mut config = AppConfig::default();
        config.llm.model = Some("from-file".into());

        Overrides {
            provider: None,
            model: Some("from-flag".into()),
            no_planner: false,
        }
        .apply(&mut config)
        .unwrap();

        assert_eq!(config.llm.model(), "from-flag");
        assert!(config.generation.query_planner);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut config = AppConfig::default();
        let result = Overrides {
            provider: Some("acme".into()),
            model: None,
            no_planner: false,
        }
        .apply(&mut config);
        assert!(result.is_err());
    }
}
