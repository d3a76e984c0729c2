//! State module for tracking pipeline progress
//!
//! # Components
//!
//! - `CrawlStage`: Tracks where a single URL is in the retrieve → extract → store sequence

mod crawl_stage;

pub use crawl_stage::CrawlStage;
