//! HTML metadata extraction
//!
//! This module turns a raw HTML document into a [`Metadata`] record. Each
//! attribute is collected from several sources (OpenGraph, Twitter cards,
//! standard meta tags, document structure) and kept as an ordered list of
//! candidates, best first.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors that can occur while extracting metadata
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Invalid source URL '{url}': {reason}")]
    InvalidSourceUrl { url: String, reason: String },

    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}

/// Metadata extracted from a document
///
/// Every field is an ordered list of candidates. The first element is the
/// conventional best choice but is not otherwise distinguished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub descriptions: Vec<String>,
}

impl Metadata {
    /// Returns true if no candidate was found for any attribute
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
            && self.titles.is_empty()
            && self.images.is_empty()
            && self.descriptions.is_empty()
    }

    pub fn title(&self) -> Option<&str> {
        self.titles.first().map(String::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.descriptions.first().map(String::as_str)
    }
}

/// Derives a metadata record from raw document contents
pub trait MetadataExtractor: Send + Sync {
    /// Extracts metadata from `contents`, fetched from `source_url`
    fn extract(&self, contents: &str, source_url: &str) -> Result<Metadata, ExtractionError>;
}

/// Metadata extractor for HTML documents
///
/// # Sources, in priority order
///
/// | Attribute | Sources |
/// |-----------|---------|
/// | titles | `og:title`, `twitter:title`, `<title>`, `<h1>` |
/// | descriptions | `og:description`, `<meta name="description">`, `twitter:description`, first `<p>` |
/// | images | `og:image`, `twitter:image`, `<img src>` |
/// | urls | `og:url`, `<link rel="canonical">`, the source URL |
///
/// Relative image and page URLs are resolved against the source URL. Duplicate
/// candidates are dropped, keeping the first occurrence.
#[derive(Debug, Clone, Default)]
pub struct HtmlMetadataExtractor;

impl HtmlMetadataExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataExtractor for HtmlMetadataExtractor {
    fn extract(&self, contents: &str, source_url: &str) -> Result<Metadata, ExtractionError> {
        let base_url = Url::parse(source_url).map_err(|e| ExtractionError::InvalidSourceUrl {
            url: source_url.to_string(),
            reason: e.to_string(),
        })?;

        let document = Html::parse_document(contents);
        let mut metadata = Metadata::default();

        // Titles
        extend_unique(&mut metadata.titles, meta_contents(&document, "meta[property='og:title']")?);
        extend_unique(
            &mut metadata.titles,
            meta_contents(&document, "meta[name='twitter:title'], meta[property='twitter:title']")?,
        );
        extend_unique(&mut metadata.titles, element_texts(&document, "title")?);
        extend_unique(&mut metadata.titles, element_texts(&document, "h1")?);

        // Descriptions
        extend_unique(
            &mut metadata.descriptions,
            meta_contents(&document, "meta[property='og:description']")?,
        );
        extend_unique(
            &mut metadata.descriptions,
            meta_contents(&document, "meta[name='description']")?,
        );
        extend_unique(
            &mut metadata.descriptions,
            meta_contents(
                &document,
                "meta[name='twitter:description'], meta[property='twitter:description']",
            )?,
        );
        extend_unique(
            &mut metadata.descriptions,
            element_texts(&document, "p")?.into_iter().take(1),
        );

        // Images
        let og_images = meta_contents(&document, "meta[property='og:image']")?;
        let twitter_images = meta_contents(
            &document,
            "meta[name='twitter:image'], meta[property='twitter:image']",
        )?;
        let inline_images = attr_values(&document, "img[src]", "src")?;
        for candidate in og_images.into_iter().chain(twitter_images).chain(inline_images) {
            if let Some(absolute) = resolve_link(&candidate, &base_url) {
                push_unique(&mut metadata.images, absolute);
            }
        }

        // URLs
        let og_urls = meta_contents(&document, "meta[property='og:url']")?;
        let canonical = attr_values(&document, "link[rel='canonical'][href]", "href")?;
        for candidate in og_urls.into_iter().chain(canonical) {
            if let Some(absolute) = resolve_link(&candidate, &base_url) {
                push_unique(&mut metadata.urls, absolute);
            }
        }
        push_unique(&mut metadata.urls, source_url.to_string());

        Ok(metadata)
    }
}

fn parse_selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector {
        selector: css.to_string(),
        reason: format!("{:?}", e),
    })
}

fn select_all<'a>(document: &'a Html, css: &str) -> Result<Vec<ElementRef<'a>>, ExtractionError> {
    let selector = parse_selector(css)?;
    Ok(document.select(&selector).collect())
}

/// Non-empty `content` attributes of the matching meta tags
fn meta_contents(document: &Html, css: &str) -> Result<Vec<String>, ExtractionError> {
    attr_values(document, css, "content")
}

fn attr_values(document: &Html, css: &str, attr: &str) -> Result<Vec<String>, ExtractionError> {
    Ok(select_all(document, css)?
        .into_iter()
        .filter_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect())
}

/// Whitespace-collapsed text of the matching elements
fn element_texts(document: &Html, css: &str) -> Result<Vec<String>, ExtractionError> {
    Ok(select_all(document, css)?
        .into_iter()
        .map(|element| {
            element
                .text()
                .flat_map(|text| text.split_whitespace())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect())
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn extend_unique(list: &mut Vec<String>, values: impl IntoIterator<Item = String>) {
    for value in values {
        push_unique(list, value);
    }
}

/// Resolves a link to an absolute http(s) URL
///
/// Returns None for `javascript:`, `data:` and other non-HTTP schemes, and
/// for values that cannot be resolved against the base URL.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("data:") {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}
