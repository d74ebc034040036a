//! Command line interface.
//!
//! This module contains the CLI parser and dispatches to the command
//! functions in [`commands`].

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use metascrape::models::ContentType;

#[derive(Parser)]
#[command(name = "metascrape")]
#[command(about = "Declarative metadata scraper engine for media libraries")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Catalog seed file (JSON) used to match scraped names
    #[arg(long, global = true, env = "METASCRAPE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Request deadline in seconds (overrides config)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// List loaded scrapers
    List {
        /// Only scrapers supporting this content type (repeatable)
        #[arg(short = 't', long = "type", value_enum)]
        types: Vec<ContentType>,
    },

    /// Show one scraper's capabilities as JSON
    Show {
        /// Scraper ID
        id: String,
    },

    /// Scrape a URL with the first scraper that claims it
    ScrapeUrl {
        url: String,
        #[arg(short = 't', long = "type", value_enum)]
        content_type: ContentType,
    },

    /// Search a scraper by name
    ScrapeName {
        /// Scraper ID
        id: String,
        /// Search query
        query: String,
        #[arg(short = 't', long = "type", value_enum, default_value = "performer")]
        content_type: ContentType,
    },

    /// Scrape from a partial fragment
    ScrapeFragment {
        /// Scraper ID
        id: String,
        #[arg(short = 't', long = "type", value_enum)]
        content_type: ContentType,
        /// Fragment JSON, or @path to read it from a file
        #[arg(long)]
        json: String,
    },

    /// Scrape seeded from a stored scene or gallery in the catalog
    ScrapeStored {
        /// Scraper ID
        id: String,
        /// Stored scene or gallery ID
        entity_id: String,
        #[arg(short = 't', long = "type", value_enum, default_value = "scene")]
        content_type: ContentType,
    },

    /// Reload and validate the definitions directory
    Reload,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let options = commands::GlobalOptions {
        config: cli.config,
        catalog: cli.catalog,
        timeout: cli.timeout,
    };

    match cli.command {
        Commands::List { types } => commands::cmd_list(&options, &types).await,
        Commands::Show { id } => commands::cmd_show(&options, &id).await,
        Commands::ScrapeUrl { url, content_type } => {
            commands::cmd_scrape_url(&options, &url, content_type).await
        }
        Commands::ScrapeName {
            id,
            query,
            content_type,
        } => commands::cmd_scrape_name(&options, &id, &query, content_type).await,
        Commands::ScrapeFragment {
            id,
            content_type,
            json,
        } => commands::cmd_scrape_fragment(&options, &id, content_type, &json).await,
        Commands::ScrapeStored {
            id,
            entity_id,
            content_type,
        } => commands::cmd_scrape_stored(&options, &id, &entity_id, content_type).await,
        Commands::Reload => commands::cmd_reload(&options).await,
    }
}
