//! Crawler coordinator - pipeline orchestration logic
//!
//! This module contains the per-URL pipeline and the batch loop that drives it:
//! - Provisioning the schema before any work
//! - Retrieving each document through the cache
//! - Extracting metadata
//! - Persisting the body, then the metadata, under the configured overwrite policy
//! - Isolating per-URL failures so a batch always runs to the end

use crate::config::PipelineConfig;
use crate::crawler::locks::KeyLocks;
use crate::crawler::retriever::{CacheAsideRetriever, ContentSource};
use crate::crawler::ContentFetcher;
use crate::extract::{FeedSource, Metadata, MetadataExtractor};
use crate::output::BatchReport;
use crate::state::CrawlStage;
use crate::storage::{HtmlRecord, InsertResult, PageRecord, StorageGateway, Table};
use crate::PipelineError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Result of processing one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    /// The processed URL
    pub url: String,

    /// Where the contents came from
    pub source: ContentSource,

    /// True if the contents or the extracted metadata were empty
    pub soft_failure: bool,
}

/// Main pipeline structure
///
/// Owns nothing durable: all state lives in the storage gateway's tables.
pub struct Crawler {
    config: PipelineConfig,
    storage: Arc<dyn StorageGateway>,
    retriever: CacheAsideRetriever,
    extractor: Arc<dyn MetadataExtractor>,
    locks: KeyLocks,
}

impl Crawler {
    /// Creates a new crawler
    ///
    /// # Arguments
    ///
    /// * `config` - Overwrite, refetch and concurrency settings
    /// * `storage` - Gateway holding the `html` and `pages` tables
    /// * `fetcher` - Used on cache misses
    /// * `extractor` - Derives metadata from document bodies
    pub fn new(
        config: PipelineConfig,
        storage: Arc<dyn StorageGateway>,
        fetcher: Arc<dyn ContentFetcher>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        let retriever = CacheAsideRetriever::new(Arc::clone(&storage), fetcher);
        Self {
            config,
            storage,
            retriever,
            extractor,
            locks: KeyLocks::new(),
        }
    }

    /// Creates the database and tables if they do not exist
    ///
    /// Must run once before any processing. Safe to call repeatedly.
    pub async fn ensure_schema(&self) -> Result<(), PipelineError> {
        self.storage.ensure_schema().await?;
        Ok(())
    }

    /// Processes a single URL
    ///
    /// This method:
    /// 1. Uses `contents` if given, otherwise retrieves the body through the cache
    /// 2. Extracts metadata from the body
    /// 3. Stores the body in the `html` table
    /// 4. Stores the metadata in the `pages` table, only if step 3 succeeded
    ///
    /// Empty contents or metadata are logged as a probable failure but do not
    /// make this call fail.
    pub async fn process(
        &self,
        url: &str,
        contents: Option<String>,
    ) -> Result<CrawlOutcome, PipelineError> {
        self.process_staged(url, contents).await.1
    }

    /// Like [`Crawler::process`], also returning the stage reached
    ///
    /// On failure the stage is the one the error happened in.
    pub async fn process_staged(
        &self,
        url: &str,
        contents: Option<String>,
    ) -> (CrawlStage, Result<CrawlOutcome, PipelineError>) {
        let mut stage = CrawlStage::Start;
        let result = self.run_stages(url, contents, &mut stage).await;

        if result.is_ok() {
            advance(url, &mut stage, CrawlStage::Done);
            return (stage, result);
        }

        // Report the stage the failure happened in, not `Failed`
        let failed_in = stage;
        advance(url, &mut stage, CrawlStage::Failed);
        (failed_in, result)
    }

    async fn run_stages(
        &self,
        url: &str,
        contents: Option<String>,
        stage: &mut CrawlStage,
    ) -> Result<CrawlOutcome, PipelineError> {
        if url.is_empty() {
            return Err(PipelineError::InvalidUrl("URL cannot be empty".to_string()));
        }

        // One writer per URL at a time
        let _guard = self.locks.lock(url).await;

        let (contents, source) = match contents {
            Some(contents) => (contents, ContentSource::Provided),
            None => {
                advance(url, stage, CrawlStage::Retrieving);
                let retrieved = self
                    .retriever
                    .retrieve(url, self.config.force_refetch)
                    .await?;
                (retrieved.contents, retrieved.source)
            }
        };

        advance(url, stage, CrawlStage::Extracting);
        let metadata = self
            .extractor
            .extract(&contents, url)
            .map_err(|source| PipelineError::Extraction {
                url: url.to_string(),
                source,
            })?;

        self.store(url, &metadata, &contents, stage).await?;

        let soft_failure = metadata.is_empty() || contents.is_empty();
        if soft_failure {
            tracing::warn!(
                "Crawl of {} appears to have failed: contents or metadata is empty",
                url
            );
        } else {
            tracing::info!(
                "Crawled {} ({:?}, title: {})",
                url,
                source,
                metadata.title().unwrap_or("-")
            );
        }

        Ok(CrawlOutcome {
            url: url.to_string(),
            source,
            soft_failure,
        })
    }

    /// Stores the body, then the metadata
    ///
    /// The page record is never written if the html write reported an error.
    async fn store(
        &self,
        url: &str,
        metadata: &Metadata,
        contents: &str,
        stage: &mut CrawlStage,
    ) -> Result<(), PipelineError> {
        let overwrite = self.config.overwrite;

        advance(url, stage, CrawlStage::StoringHtml);
        let result = self
            .storage
            .insert(Table::Html, HtmlRecord::new(url, contents).into(), overwrite)
            .await?;
        check_insert(url, Table::Html, result)?;

        advance(url, stage, CrawlStage::StoringPage);
        let result = self
            .storage
            .insert(
                Table::Page,
                PageRecord::new(url, metadata.clone()).into(),
                overwrite,
            )
            .await?;
        check_insert(url, Table::Page, result)?;

        Ok(())
    }

    /// Processes every URL in `urls`
    ///
    /// Runs sequentially unless `max_concurrent_urls` is greater than one.
    /// Failures are logged with their URL and collected in the report; they
    /// never stop the batch. Duplicate URLs are processed once per occurrence.
    pub async fn process_batch(self: &Arc<Self>, urls: Vec<String>) -> BatchReport {
        let mut report = BatchReport::start(urls.len());
        let limit = self.config.max_concurrent_urls.max(1) as usize;

        tracing::info!("Processing {} URLs (concurrency {})", urls.len(), limit);

        if limit == 1 {
            for url in &urls {
                let (stage, result) = self.process_staged(url, None).await;
                log_failure(url, stage, &result);
                report.record(url, stage, &result);
            }
        } else {
            for (url, stage, result) in self.process_concurrently(urls, limit).await {
                log_failure(&url, stage, &result);
                report.record(&url, stage, &result);
            }
        }

        report.finish();
        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            report.succeeded,
            report.failed()
        );
        report
    }

    /// Runs up to `limit` URLs at once and returns results in input order
    async fn process_concurrently(
        self: &Arc<Self>,
        urls: Vec<String>,
        limit: usize,
    ) -> Vec<(String, CrawlStage, Result<CrawlOutcome, PipelineError>)> {
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::new();

        for (index, url) in urls.into_iter().enumerate() {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let crawler = Arc::clone(self);
            let task_url = url.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                crawler.process_staged(&task_url, None).await
            });
            spawned.insert(handle.id(), (index, url));
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, joined) = match joined {
                Ok((id, staged)) => (id, Ok(staged)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some((index, url)) = spawned.remove(&id) else {
                continue;
            };

            // A panicking task still counts as a failure of its URL
            let (stage, result) = joined.unwrap_or_else(|e| {
                let error = PipelineError::Task {
                    url: url.clone(),
                    reason: e.to_string(),
                };
                (CrawlStage::Failed, Err(error))
            });
            results.push((index, url, stage, result));
        }

        results.sort_by_key(|(index, ..)| *index);
        results
            .into_iter()
            .map(|(_, url, stage, result)| (url, stage, result))
            .collect()
    }

    /// Processes every item of a feed
    ///
    /// # Returns
    ///
    /// * `Ok(BatchReport)` - The feed was read; per-item failures are in the report
    /// * `Err(PipelineError)` - The feed itself could not be read
    pub async fn crawl_feed(
        self: &Arc<Self>,
        feed: &dyn FeedSource,
        feed_url: &str,
    ) -> Result<BatchReport, PipelineError> {
        tracing::info!("Reading feed {}", feed_url);

        let urls = feed
            .links(feed_url)
            .await
            .map_err(|source| PipelineError::Feed {
                url: feed_url.to_string(),
                source,
            })?;

        tracing::info!("Feed {} lists {} items", feed_url, urls.len());
        Ok(self.process_batch(urls).await)
    }
}

/// Moves `stage` to `next`, logging invalid transitions
fn advance(url: &str, stage: &mut CrawlStage, next: CrawlStage) {
    if !stage.can_transition_to(next) {
        tracing::warn!("Unexpected stage transition for {}: {} -> {}", url, stage, next);
    }
    tracing::trace!("{}: {} -> {}", url, stage, next);
    *stage = next;
}

/// Turns an insert that reported errors into a `Store` error
fn check_insert(url: &str, table: Table, result: InsertResult) -> Result<(), PipelineError> {
    if result.is_ok() {
        return Ok(());
    }

    Err(PipelineError::Store {
        url: url.to_string(),
        table,
        errors: result.errors,
        first_error: result
            .first_error
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}

fn log_failure(url: &str, stage: CrawlStage, result: &Result<CrawlOutcome, PipelineError>) {
    if let Err(e) = result {
        tracing::error!("Error processing {} ({}): {}", url, stage, e);
    }
}
