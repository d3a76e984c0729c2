//! Batch reports and table statistics
//!
//! This module provides the per-run report produced by the batch driver and
//! the table counts shown by `--stats`.

use crate::crawler::{ContentSource, CrawlOutcome};
use crate::state::CrawlStage;
use crate::storage::{open_storage, StorageGateway, Table};
use crate::PipelineError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// A URL whose processing failed
#[derive(Debug, Clone)]
pub struct CrawlFailure {
    /// The URL that failed
    pub url: String,

    /// The stage the pipeline was in when it failed
    pub stage: CrawlStage,

    /// Error message
    pub message: String,
}

/// Summary of one batch of URLs
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Number of URLs handed to the batch
    pub total: usize,

    /// URLs whose records were both written
    pub succeeded: u64,

    /// Bodies served from the `html` table
    pub cache_hits: u64,

    /// Bodies fetched from the network
    pub fetched: u64,

    /// Succeeded, but with empty contents or metadata
    pub soft_failures: u64,

    /// Failed URLs in input order
    pub failures: Vec<CrawlFailure>,
}

impl BatchReport {
    /// Starts a report for a batch of `total` URLs
    pub fn start(total: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            total,
            succeeded: 0,
            cache_hits: 0,
            fetched: 0,
            soft_failures: 0,
            failures: Vec::new(),
        }
    }

    /// Records the outcome of one URL
    pub fn record(
        &mut self,
        url: &str,
        stage: CrawlStage,
        result: &Result<CrawlOutcome, PipelineError>,
    ) {
        match result {
            Ok(outcome) => {
                self.succeeded += 1;
                match outcome.source {
                    ContentSource::Cache => self.cache_hits += 1,
                    ContentSource::Network => self.fetched += 1,
                    ContentSource::Provided => {}
                }
                if outcome.soft_failure {
                    self.soft_failures += 1;
                }
            }
            Err(e) => self.failures.push(CrawlFailure {
                url: url.to_string(),
                stage,
                message: e.to_string(),
            }),
        }
    }

    /// Marks the batch as finished
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Number of failed URLs
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Wall-clock duration of the batch, if finished
    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}

/// Prints a batch report to stdout
pub fn print_report(report: &BatchReport) {
    println!("=== Crawl Report ===\n");

    println!("Overview:");
    println!("  URLs in batch: {}", report.total);
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed: {}", report.failed());
    println!("  Served from cache: {}", report.cache_hits);
    println!("  Fetched: {}", report.fetched);
    if report.soft_failures > 0 {
        println!("  Empty contents or metadata: {}", report.soft_failures);
    }
    if let Some(seconds) = report.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }

    if !report.failures.is_empty() {
        println!("\nFailures:");
        for failure in &report.failures {
            println!("  {} [{}]: {}", failure.url, failure.stage, failure.message);
        }
    }
}

/// Record counts per table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatistics {
    pub html_records: u64,
    pub page_records: u64,
}

/// Loads table statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(TableStatistics)` - Successfully loaded statistics
/// * `Err(PipelineError)` - Failed to query statistics
pub async fn load_statistics(storage: &dyn StorageGateway) -> Result<TableStatistics, PipelineError> {
    Ok(TableStatistics {
        html_records: storage.count(Table::Html).await?,
        page_records: storage.count(Table::Page).await?,
    })
}

/// Loads table statistics from the database file at `path`
///
/// Returns `Ok(None)` without creating anything if the file does not exist.
/// Missing tables are created so an empty database reports zero counts.
pub async fn load_statistics_at(path: &Path) -> Result<Option<TableStatistics>, PipelineError> {
    if !path.exists() {
        tracing::debug!("No database at {}", path.display());
        return Ok(None);
    }

    let storage = open_storage(path)?;
    storage.ensure_schema().await?;
    Ok(Some(load_statistics(&storage).await?))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &TableStatistics) {
    println!("=== Storage Statistics ===\n");
    println!("  {} records: {}", Table::Html, stats.html_records);
    println!("  {} records: {}", Table::Page, stats.page_records);

    // An html row without its page row means the metadata write failed
    if stats.html_records > stats.page_records {
        println!(
            "\n  {} bodies have no metadata record",
            stats.html_records - stats.page_records
        );
    }
}
