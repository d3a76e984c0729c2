//! Sumi-Extract main entry point
//!
//! This is the command-line interface for the Sumi-Extract feed pipeline.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_extract::config::{load_config_with_hash, validate, Config};
use sumi_extract::output::{load_statistics_at, print_report, print_statistics};
use sumi_extract::storage::open_storage;
use sumi_extract::{Crawler, FeedLinkExtractor, HtmlMetadataExtractor, HttpFetcher};
use tracing_subscriber::EnvFilter;

/// Sumi-Extract: A cache-aside feed content pipeline
///
/// Sumi-Extract reads the items of an RSS or Atom feed, retrieves each
/// document (from the local database when already stored), extracts its
/// metadata, and stores both the body and the metadata keyed by URL.
#[derive(Parser, Debug)]
#[command(name = "sumi-extract")]
#[command(version = "1.0.0")]
#[command(about = "A cache-aside feed content pipeline", long_about = None)]
struct Cli {
    /// URL of the RSS or Atom feed to process
    #[arg(value_name = "FEED_URL", required_unless_present = "stats")]
    feed_url: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replace records that already exist
    #[arg(long)]
    overwrite: bool,

    /// Fetch every document even if a body is already stored
    #[arg(long)]
    refetch: bool,

    /// Number of URLs processed at once
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show record counts from the database and exit
    #[arg(long, conflicts_with = "feed_url")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load(&cli)?;

    if cli.stats {
        handle_stats(&config).await?;
    } else if let Some(feed_url) = &cli.feed_url {
        handle_feed(config, feed_url).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_extract=info,warn"),
            1 => EnvFilter::new("sumi_extract=debug,info"),
            2 => EnvFilter::new("sumi_extract=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file if given, then applies command-line overrides
fn load(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((cfg, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    cfg
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => Config::default(),
    };

    if cli.overwrite {
        config.pipeline.overwrite = true;
    }
    if cli.refetch {
        config.pipeline.force_refetch = true;
    }
    if let Some(concurrency) = cli.concurrency {
        config.pipeline.max_concurrent_urls = concurrency;
    }

    validate(&config)?;
    Ok(config)
}

/// Handles the --stats mode: shows record counts from the database
async fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(&config.storage.database_path);
    println!("Database: {}\n", path.display());

    match load_statistics_at(path).await? {
        Some(stats) => print_statistics(&stats),
        None => println!("No database found; nothing has been crawled yet."),
    }

    Ok(())
}

/// Handles the main pipeline run over one feed
async fn handle_feed(config: Config, feed_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Starting pipeline (overwrite: {}, refetch: {}, concurrency: {})",
        config.pipeline.overwrite,
        config.pipeline.force_refetch,
        config.pipeline.max_concurrent_urls
    );

    let storage = Arc::new(open_storage(Path::new(&config.storage.database_path))?);
    let fetcher = Arc::new(HttpFetcher::new(&config)?);

    let crawler = Arc::new(Crawler::new(
        config.pipeline.clone(),
        storage,
        fetcher.clone(),
        Arc::new(HtmlMetadataExtractor::new()),
    ));

    // Tables must exist before the first lookup
    crawler.ensure_schema().await?;

    let feed = FeedLinkExtractor::new(fetcher);
    match crawler.crawl_feed(&feed, feed_url).await {
        Ok(report) => {
            print_report(&report);
            tracing::info!("Pipeline completed");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Pipeline failed: {}", e);
            Err(e.into())
        }
    }
}
