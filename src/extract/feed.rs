//! Feed link extraction
//!
//! Turns an RSS 2.0 / RSS 1.0 / Atom document into the ordered list of item
//! URLs it announces. Entries keep feed-publication order and duplicates are
//! kept as-is.

use crate::crawler::{ContentFetcher, FetchError};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while reading a feed
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Document is not an RSS or Atom feed")]
    NotAFeed,

    #[error("Invalid selector '{0}'")]
    Selector(String),
}

/// Produces the item URLs of a feed
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Lists the item URLs of the feed at `feed_url`, in publication order
    async fn links(&self, feed_url: &str) -> Result<Vec<String>, FeedError>;
}

/// Feed source that downloads the feed with a [`ContentFetcher`] and parses it
pub struct FeedLinkExtractor {
    fetcher: Arc<dyn ContentFetcher>,
}

impl FeedLinkExtractor {
    pub fn new(fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FeedSource for FeedLinkExtractor {
    async fn links(&self, feed_url: &str) -> Result<Vec<String>, FeedError> {
        let contents = self.fetcher.fetch(feed_url).await?;
        let links = parse_feed_links(&contents)?;
        tracing::debug!("Feed {} lists {} items", feed_url, links.len());
        Ok(links)
    }
}

fn selector(css: &str) -> Result<Selector, FeedError> {
    Selector::parse(css).map_err(|_| FeedError::Selector(css.to_string()))
}

/// Parses a feed document and returns its item links
///
/// # Link Extraction Rules
///
/// - RSS `<item>`: text of the `<link>` element, falling back to a
///   `<guid>` that looks like an http(s) URL
/// - Atom `<entry>`: `href` of the `<link>` with `rel="alternate"` or no
///   `rel`, falling back to the first `<link href>` of any relation
///
/// Items without a usable link are skipped.
///
/// # Example
///
/// ```
/// use sumi_extract::extract::parse_feed_links;
///
/// let rss = r#"<rss><channel><item><link>http://example.com/a</link></item></channel></rss>"#;
/// assert_eq!(parse_feed_links(rss).unwrap(), vec!["http://example.com/a"]);
/// ```
pub fn parse_feed_links(contents: &str) -> Result<Vec<String>, FeedError> {
    let document = Html::parse_document(contents);

    let root_selector = selector("rss, feed, channel")?;
    if document.select(&root_selector).next().is_none() {
        return Err(FeedError::NotAFeed);
    }

    let entry_selector = selector("item, entry")?;
    let link_selector = selector("link")?;
    let guid_selector = selector("guid")?;

    let links = document
        .select(&entry_selector)
        .filter_map(|entry| {
            let link = entry_link(entry, &link_selector, &guid_selector);
            if link.is_none() {
                tracing::debug!("Skipping feed entry without a usable link");
            }
            link
        })
        .collect();

    Ok(links)
}

fn entry_link(entry: ElementRef, link_selector: &Selector, guid_selector: &Selector) -> Option<String> {
    let mut fallback = None;

    for link in entry.select(link_selector) {
        if let Some(href) = link.value().attr("href") {
            let href = href.trim();
            if href.is_empty() {
                continue;
            }
            match link.value().attr("rel") {
                None | Some("alternate") => return Some(href.to_string()),
                Some(_) => {
                    fallback.get_or_insert_with(|| href.to_string());
                }
            }
            continue;
        }

        // `<link>` is a void element in HTML, so an RSS link's URL ends up in
        // the node right after it.
        if let Some(text) = link.next_sibling().and_then(|node| rss_link_text(node.value())) {
            return Some(text);
        }
    }

    fallback.or_else(|| {
        entry
            .select(guid_selector)
            .next()
            .map(|guid| guid.text().collect::<String>().trim().to_string())
            .filter(|guid| guid.starts_with("http://") || guid.starts_with("https://"))
    })
}

/// Reads an RSS link URL from the node following a `<link>` tag
///
/// Outside foreign content html5ever turns `<![CDATA[...]]>` into a comment
/// holding `[CDATA[...]]`, so both text and such comments are accepted.
fn rss_link_text(node: &Node) -> Option<String> {
    let text = match node {
        Node::Text(text) => text.trim(),
        Node::Comment(comment) => comment
            .trim()
            .strip_prefix("[CDATA[")?
            .strip_suffix("]]")?
            .trim(),
        _ => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
