//! Command-line interface definitions for Sigment Reader.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials and the server port can also come from environment variables
//! (or a `.env` file).

use crate::config::{Config, ManagedConfig};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Sigment Reader application.
///
/// # Examples
///
/// ```sh
/// # Serve the HTTP API using the managed extraction service
/// FIRECRAWL_API_URL=https://api.firecrawl.dev FIRECRAWL_API_KEY=fc-... sigment_reader serve
///
/// # One-off run without the managed service
/// sigment_reader --direct-only fetch --limit 20 --months 3 --output articles.json
///
/// # Scrape one article
/// sigment_reader scrape https://techcrunch.com/2025/05/06/some-story/
///
/// # Summarize a previous run
/// OPENAI_API_KEY=sk-... sigment_reader clean --input articles.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Skip the managed extraction service and scrape pages directly
    #[arg(long, global = true)]
    pub direct_only: bool,

    /// Managed extraction service base URL
    #[arg(long, env = "FIRECRAWL_API_URL", global = true)]
    pub firecrawl_api_url: Option<String>,

    /// Managed extraction service API key
    #[arg(long, env = "FIRECRAWL_API_KEY", global = true, hide_env_values = true)]
    pub firecrawl_api_key: Option<String>,

    /// Text-generation provider API key
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },

    /// Run the pipeline once and write RawArticle JSON
    Fetch {
        /// Articles to scrape in total (1-300)
        #[arg(
            short,
            long,
            default_value_t = 100,
            value_parser = RangedU64ValueParser::<usize>::new().range(1..=300)
        )]
        limit: usize,

        /// Months of archive to walk (1-36)
        #[arg(short, long, default_value_t = 12, value_parser = clap::value_parser!(u32).range(1..=36))]
        months: u32,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scrape a single article URL and print its RawArticle JSON
    Scrape { url: String },

    /// Normalize and summarize a RawArticle JSON file
    Clean {
        #[arg(short, long)]
        input: PathBuf,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Layer flag and environment values over a loaded config.
    pub fn apply(&self, config: &mut Config) {
        let url = non_blank(self.firecrawl_api_url.as_deref());
        let key = non_blank(self.firecrawl_api_key.as_deref());
        if let Some(managed) = config.managed.as_mut() {
            if let Some(url) = url {
                managed.base_url = url;
            }
            if let Some(key) = key {
                managed.api_key = key;
            }
        } else if let (Some(url), Some(key)) = (url, key) {
            config.managed = Some(ManagedConfig::new(url, key));
        }

        if let Some(key) = non_blank(self.openai_api_key.as_deref()) {
            config.llm.api_key = Some(key);
        }

        if let Command::Serve { host, port } = &self.command {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
