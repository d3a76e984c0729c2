//! Crawler module for document retrieval and pipeline orchestration
//!
//! This module contains the core pipeline logic, including:
//! - HTTP fetching behind the `ContentFetcher` trait
//! - Cache-aside retrieval through the `html` table
//! - Per-URL locking for concurrent batches
//! - Overall pipeline coordination

mod coordinator;
mod fetcher;
mod locks;
mod retriever;

pub use coordinator::{CrawlOutcome, Crawler};
pub use fetcher::{build_http_client, ContentFetcher, FetchError, HttpFetcher};
pub use locks::{KeyGuard, KeyLocks};
pub use retriever::{CacheAsideRetriever, ContentSource, Retrieved};
