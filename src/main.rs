//! # Sigment Reader
//!
//! A scrape-and-normalize pipeline for tech news. It discovers article URLs
//! across paginated source archives, extracts readable text (through a managed
//! extraction service, falling back to direct fetching), and normalizes the
//! results into a fixed schema, optionally summarized by a language model.
//!
//! ## Sources
//!
//! - TechCrunch (monthly archives)
//! - Lenny's Newsletter (archive page)
//! - TLDR (archive page)
//!
//! ## Usage
//!
//! ```sh
//! sigment_reader serve --port 3001
//! sigment_reader fetch --limit 20 --months 3 -o articles.json
//! sigment_reader scrape https://techcrunch.com/2025/05/06/some-story/
//! sigment_reader clean -i articles.json -o normalized.json
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Discovery**: walk each source's archive pages for canonical article URLs
//! 2. **Scraping**: fetch article content with bounded concurrency (3 at a time)
//! 3. **Cleaning**: batch articles and send each batch to the model for normalization
//! 4. **Output**: JSON over HTTP, to stdout, or to a file

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod chunk;
mod cli;
mod config;
mod discover;
mod error;
mod extract;
mod fetcher;
mod models;
mod normalize;
mod pipeline;
mod retry;
mod scrapers;
mod server;
mod utils;

use api::{ChatClient, RetryAsk};
use cli::{Cli, Command};
use config::Config;
use error::{Result, ValidationError};
use fetcher::Fetcher;
use models::{Publication, RawArticle};
use normalize::Normalizer;
use pipeline::Pipeline;
use scrapers::{ArticleScraper, SourceScraper};
use utils::write_json;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        debug!(error = %e, "No .env file loaded");
    }

    let start_time = std::time::Instant::now();
    info!("sigment_reader starting up");

    let args = Cli::parse();
    debug!(?args.command, ?args.config, direct_only = args.direct_only, "Parsed CLI arguments");

    match run(args).await {
        Ok(()) => {
            let elapsed = start_time.elapsed();
            info!(?elapsed, secs = elapsed.as_secs(), millis = elapsed.subsec_millis(), "Execution complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

#[instrument(level = "info", skip_all)]
async fn run(args: Cli) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    match &args.command {
        Command::Serve { .. } => {
            let state = server::AppState::new(&config, args.direct_only)?;
            server::serve(state, &config.server).await
        }
        Command::Fetch { limit, months, output } => {
            let pipeline = Pipeline::from_config(&config, args.direct_only)?;
            let articles = pipeline.run(*limit, *months).await;
            info!(count = articles.len(), "Fetched articles");
            write_json(&articles, output.as_deref()).await
        }
        Command::Scrape { url } => {
            let publication =
                Publication::from_url(url).ok_or_else(|| ValidationError::UnknownSource(url.clone()))?;
            let scraper = SourceScraper::from_config(&config, Fetcher::new(&config.fetch)?, args.direct_only)?;
            let article = scraper.scrape_one(url, publication).await?;
            write_json(&article, None).await
        }
        Command::Clean { input, output } => {
            // Fail on a missing key before reading any input.
            let client = ChatClient::new(&config.llm)?;
            let normalizer = Normalizer::new(RetryAsk::new(client, config.llm.retry_policy()), config.batch);

            let raw = tokio::fs::read_to_string(input).await?;
            let articles: Vec<RawArticle> = serde_json::from_str(&raw).inspect_err(|e| {
                error!(path = %input.display(), error = %e, "Input is not a valid RawArticle array");
            })?;
            info!(count = articles.len(), path = %input.display(), "Loaded articles");

            let cleaned = normalizer.clean(&articles).await;
            write_json(&cleaned, output.as_deref()).await
        }
    }
}
