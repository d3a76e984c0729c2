//! Output module for crawl reports
//!
//! This module handles:
//! - Summarizing the outcome of a batch of URLs
//! - Reporting record counts from storage

pub mod stats;

pub use stats::{
    load_statistics, load_statistics_at, print_report, print_statistics, BatchReport, CrawlFailure,
    TableStatistics,
};
