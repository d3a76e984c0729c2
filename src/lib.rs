//! Sumi-Extract: a cache-aside content pipeline for feeds
//!
//! This crate reads the item URLs of a feed, retrieves each document (from the
//! local store when it has already been fetched, from the network otherwise),
//! extracts a metadata record from it, and persists both the raw body and the
//! metadata keyed by URL.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Extract operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        source: crawler::FetchError,
    },

    #[error("Metadata extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        source: extract::ExtractionError,
    },

    #[error("Failed to store {table} record for {url}: {errors} error(s), first error: {first_error}")]
    Store {
        url: String,
        table: storage::Table,
        errors: u64,
        first_error: String,
    },

    #[error("Failed to read feed {url}: {source}")]
    Feed {
        url: String,
        source: extract::FeedError,
    },

    #[error("Processing task for {url} failed: {reason}")]
    Task { url: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Sumi-Extract operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CacheAsideRetriever, ContentFetcher, Crawler, HttpFetcher};
pub use extract::{FeedLinkExtractor, FeedSource, HtmlMetadataExtractor, Metadata, MetadataExtractor};
pub use state::CrawlStage;
pub use storage::{HtmlRecord, PageRecord, Record, SqliteGateway, StorageGateway, Table};
