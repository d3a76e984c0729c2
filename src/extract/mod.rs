//! Extraction module for feeds and documents
//!
//! This module contains the two parsing steps of the pipeline:
//! - Turning a feed into the list of item URLs to process
//! - Deriving a metadata record from a fetched document

mod feed;
mod metadata;

pub use feed::{parse_feed_links, FeedError, FeedLinkExtractor, FeedSource};
pub use metadata::{ExtractionError, HtmlMetadataExtractor, Metadata, MetadataExtractor};
