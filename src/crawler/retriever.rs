//! Cache-aside document retrieval
//!
//! The `html` table acts as a cache in front of the network: a stored body is
//! returned without fetching, anything else falls through to the fetcher.
//! Storage is an accelerator only, so a failing lookup is treated as a miss.

use crate::crawler::ContentFetcher;
use crate::storage::{Record, StorageGateway, Table};
use crate::PipelineError;
use std::sync::Arc;

/// Where the contents of a processed document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    /// Supplied by the caller
    Provided,
    /// Served from the `html` table
    Cache,
    /// Fetched from the network
    Network,
}

/// Contents returned by [`CacheAsideRetriever::retrieve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub contents: String,
    pub source: ContentSource,
}

/// Serves document bodies from storage, falling back to the fetcher
pub struct CacheAsideRetriever {
    storage: Arc<dyn StorageGateway>,
    fetcher: Arc<dyn ContentFetcher>,
}

impl CacheAsideRetriever {
    pub fn new(storage: Arc<dyn StorageGateway>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self { storage, fetcher }
    }

    /// Retrieves the body of `url`
    ///
    /// # Retrieval Flow
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Stored body, non-empty, no refetch | Return stored body |
    /// | No stored body | Fetch |
    /// | Stored body is empty | Fetch |
    /// | `force_refetch` | Fetch without lookup |
    /// | Lookup fails | Log, then fetch |
    /// | Fetch fails | `PipelineError::Fetch` |
    pub async fn retrieve(&self, url: &str, force_refetch: bool) -> Result<Retrieved, PipelineError> {
        if !force_refetch {
            if let Some(contents) = self.lookup(url).await {
                tracing::debug!("Cache hit for {}", url);
                return Ok(Retrieved {
                    contents,
                    source: ContentSource::Cache,
                });
            }
        }

        let contents = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| PipelineError::Fetch {
                url: url.to_string(),
                source,
            })?;

        Ok(Retrieved {
            contents,
            source: ContentSource::Network,
        })
    }

    /// Returns the stored, non-empty body of `url`, if any
    async fn lookup(&self, url: &str) -> Option<String> {
        match self.storage.get(Table::Html, url).await {
            Ok(Some(Record::Html(record))) if !record.contents.is_empty() => Some(record.contents),
            Ok(Some(Record::Html(_))) => {
                tracing::debug!("Stored body for {} is empty, refetching", url);
                None
            }
            Ok(Some(Record::Page(_))) | Ok(None) => {
                tracing::debug!("Cache miss for {}", url);
                None
            }
            Err(e) => {
                tracing::warn!("Cache lookup failed for {}, fetching instead: {}", url, e);
                None
            }
        }
    }
}
