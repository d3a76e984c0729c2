//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the pipeline, including:
//! - Building HTTP clients with proper user agent strings and timeouts
//! - GET requests to fetch document bodies
//! - Error classification
//!
//! Failures are reported once and never retried here; retry policy belongs to
//! whoever drives the pipeline.

use crate::config::{Config, FetchConfig, UserAgentConfig};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching a document
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Retrieves the raw body of a document
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches `url` and returns the full response body as text
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `fetch` - Timeout settings
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_extract::config::Config;
/// use sumi_extract::crawler::build_http_client;
///
/// let config = Config::default();
/// let client = build_http_client(&config.user_agent, &config.fetch).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(fetch.timeout_secs))
        .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Content fetcher backed by a reqwest client
///
/// The body is passed through whatever the response status, unless
/// `fail_on_http_error` is set, in which case non-2xx responses become
/// [`FetchError::Status`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    fail_on_http_error: bool,
}

impl HttpFetcher {
    /// Creates a fetcher from the crawler configuration
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = build_http_client(&config.user_agent, &config.fetch)
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self::with_client(client, config.fetch.fail_on_http_error))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client, fail_on_http_error: bool) -> Self {
        Self {
            client,
            fail_on_http_error,
        }
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            if self.fail_on_http_error {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                });
            }
            tracing::warn!("{} returned HTTP {}, keeping body", url, status.as_u16());
        }

        let body = response.text().await?;
        tracing::debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }
}
