//! Integration tests for the pipeline
//!
//! These tests use wiremock to create mock HTTP servers and a SQLite database
//! in a temporary directory to test the full retrieve, extract and store cycle.

use std::path::Path;
use std::sync::Arc;
use sumi_extract::config::{Config, PipelineConfig};
use sumi_extract::crawler::ContentSource;
use sumi_extract::storage::open_storage;
use sumi_extract::{
    Crawler, FeedLinkExtractor, HtmlMetadataExtractor, HtmlRecord, HttpFetcher, PipelineError,
    Record, SqliteGateway, StorageGateway, Table,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration storing into `dir`
fn create_test_config(dir: &TempDir, pipeline: PipelineConfig) -> Config {
    let mut config = Config::default();
    config.storage.database_path = dir
        .path()
        .join("crawl.db")
        .to_string_lossy()
        .into_owned();
    config.user_agent.crawler_name = "TestBot".to_string();
    config.fetch.timeout_secs = 5;
    config.fetch.connect_timeout_secs = 2;
    config.pipeline = pipeline;
    config
}

/// Opens the test database and builds a crawler over it
async fn create_crawler(config: &Config) -> (Arc<Crawler>, Arc<SqliteGateway>, Arc<HttpFetcher>) {
    let storage = Arc::new(
        open_storage(Path::new(&config.storage.database_path)).expect("Failed to open storage"),
    );
    let fetcher = Arc::new(HttpFetcher::new(config).expect("Failed to build fetcher"));
    let crawler = Arc::new(Crawler::new(
        config.pipeline.clone(),
        storage.clone(),
        fetcher.clone(),
        Arc::new(HtmlMetadataExtractor::new()),
    ));
    crawler.ensure_schema().await.expect("Failed to create schema");
    (crawler, storage, fetcher)
}

fn page_html(title: &str) -> String {
    format!(
        r#"<html><head><title>{}</title>
        <meta name="description" content="About {}"></head>
        <body><h1>{}</h1></body></html>"#,
        title, title, title
    )
}

async fn mount_page(server: &MockServer, route: &str, title: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page_html(title))
                .insert_header("content-type", "text/html"),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_cache_hit_avoids_network() {
    let mock_server = MockServer::start().await;
    // A stored body must never reach the network
    mount_page(&mock_server, "/a", "Network", 0).await;

    let dir = TempDir::new().unwrap();
    // Without overwrite the html write would conflict with the stored body
    let config = create_test_config(
        &dir,
        PipelineConfig {
            overwrite: true,
            ..PipelineConfig::default()
        },
    );
    let (crawler, storage, _) = create_crawler(&config).await;

    let url = format!("{}/a", mock_server.uri());
    storage
        .insert(Table::Html, HtmlRecord::new(&url, page_html("Cached")).into(), false)
        .await
        .unwrap();

    let outcome = crawler.process(&url, None).await.unwrap();
    assert_eq!(outcome.source, ContentSource::Cache);

    let page = storage
        .get(Table::Page, &url)
        .await
        .unwrap()
        .and_then(Record::into_page)
        .expect("page record should exist");
    assert_eq!(page.metadata.title(), Some("Cached"));
}

#[tokio::test]
async fn test_cache_miss_fetches_once() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/a", "Fresh", 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, PipelineConfig::default());
    let (crawler, storage, _) = create_crawler(&config).await;

    let url = format!("{}/a", mock_server.uri());
    let outcome = crawler.process(&url, None).await.unwrap();

    assert_eq!(outcome.source, ContentSource::Network);
    assert!(!outcome.soft_failure);

    let html = storage
        .get(Table::Html, &url)
        .await
        .unwrap()
        .and_then(Record::into_html)
        .expect("html record should exist");
    assert!(html.contents.contains("<title>Fresh</title>"));

    let page = storage
        .get(Table::Page, &url)
        .await
        .unwrap()
        .and_then(Record::into_page)
        .expect("page record should exist");
    assert_eq!(page.metadata.title(), Some("Fresh"));
    assert_eq!(page.metadata.description(), Some("About Fresh"));
}

#[tokio::test]
async fn test_existing_html_blocks_page_write() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/a", "Network", 0).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, PipelineConfig::default());
    let (crawler, storage, _) = create_crawler(&config).await;

    let url = format!("{}/a", mock_server.uri());
    storage
        .insert(Table::Html, HtmlRecord::new(&url, page_html("Old")).into(), false)
        .await
        .unwrap();

    let result = crawler.process(&url, None).await;

    match result {
        Err(PipelineError::Store { table, errors, .. }) => {
            assert_eq!(table, Table::Html);
            assert_eq!(errors, 1);
        }
        other => panic!("expected html store error, got {:?}", other),
    }
    assert_eq!(storage.count(Table::Page).await.unwrap(), 0);

    // The stored body is untouched
    let html = storage
        .get(Table::Html, &url)
        .await
        .unwrap()
        .and_then(Record::into_html)
        .unwrap();
    assert!(html.contents.contains("Old"));
}

#[tokio::test]
async fn test_schema_provisioning_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, PipelineConfig::default());

    let (crawler, storage, _) = create_crawler(&config).await;
    storage
        .insert(
            Table::Html,
            HtmlRecord::new("http://example.com/a", "body").into(),
            false,
        )
        .await
        .unwrap();

    crawler.ensure_schema().await.unwrap();
    drop(crawler);
    drop(storage);

    // Reopening the same file keeps existing rows
    let (crawler, storage, _) = create_crawler(&config).await;
    crawler.ensure_schema().await.unwrap();
    assert_eq!(storage.count(Table::Html).await.unwrap(), 1);
    assert_eq!(storage.count(Table::Page).await.unwrap(), 0);
}

#[tokio::test]
async fn test_overwrite_replaces_records() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/a", "New", 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        PipelineConfig {
            overwrite: true,
            force_refetch: true,
            ..PipelineConfig::default()
        },
    );
    let (crawler, storage, _) = create_crawler(&config).await;

    let url = format!("{}/a", mock_server.uri());
    storage
        .insert(Table::Html, HtmlRecord::new(&url, page_html("Old")).into(), false)
        .await
        .unwrap();

    let outcome = crawler.process(&url, None).await.unwrap();
    assert_eq!(outcome.source, ContentSource::Network);

    let html = storage
        .get(Table::Html, &url)
        .await
        .unwrap()
        .and_then(Record::into_html)
        .unwrap();
    assert!(html.contents.contains("New"));
    assert_eq!(storage.count(Table::Html).await.unwrap(), 1);
    assert_eq!(storage.count(Table::Page).await.unwrap(), 1);
}

#[tokio::test]
async fn test_batch_survives_unreachable_url() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/b", "B", 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, PipelineConfig::default());
    let (crawler, storage, _) = create_crawler(&config).await;

    let unreachable = "http://127.0.0.1:1/a".to_string();
    let reachable = format!("{}/b", mock_server.uri());

    let report = crawler
        .process_batch(vec![unreachable.clone(), reachable.clone()])
        .await;

    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].url, unreachable);

    assert!(storage.get(Table::Html, &unreachable).await.unwrap().is_none());
    assert!(storage.get(Table::Page, &unreachable).await.unwrap().is_none());
    assert!(storage.get(Table::Page, &reachable).await.unwrap().is_some());
}

#[tokio::test]
async fn test_feed_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<?xml version="1.0"?>
                    <rss version="2.0"><channel><title>Test</title>
                    <item><title>A</title><link>{}/a</link></item>
                    <item><title>B</title><link>{}/b</link></item>
                    </channel></rss>"#,
                    base_url, base_url
                ))
                .insert_header("content-type", "application/rss+xml"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/a", "a", 1).await;
    mount_page(&mock_server, "/b", "b", 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, PipelineConfig::default());
    let (crawler, storage, fetcher) = create_crawler(&config).await;

    let feed = FeedLinkExtractor::new(fetcher);
    let report = crawler
        .crawl_feed(&feed, &format!("{}/feed.xml", base_url))
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.fetched, 2);

    for title in ["a", "b"] {
        let url = format!("{}/{}", base_url, title);
        let page = storage
            .get(Table::Page, &url)
            .await
            .unwrap()
            .and_then(Record::into_page)
            .expect("page record should exist");
        assert_eq!(page.metadata.title(), Some(title));
    }
    assert_eq!(storage.count(Table::Html).await.unwrap(), 2);
}

#[tokio::test]
async fn test_unreadable_feed_is_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>nope</body></html>"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, PipelineConfig::default());
    let (crawler, storage, fetcher) = create_crawler(&config).await;

    let feed = FeedLinkExtractor::new(fetcher);
    let result = crawler
        .crawl_feed(&feed, &format!("{}/feed.xml", mock_server.uri()))
        .await;

    assert!(matches!(result, Err(PipelineError::Feed { .. })));
    assert_eq!(storage.count(Table::Html).await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_batch_fetches_duplicate_once() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/a", "A", 1).await;
    mount_page(&mock_server, "/b", "B", 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        PipelineConfig {
            overwrite: true,
            max_concurrent_urls: 4,
            ..PipelineConfig::default()
        },
    );
    let (crawler, storage, _) = create_crawler(&config).await;

    let a = format!("{}/a", mock_server.uri());
    let b = format!("{}/b", mock_server.uri());
    let report = crawler
        .process_batch(vec![a.clone(), b.clone(), a.clone()])
        .await;

    // The second `a` waits for the first and is then served from cache
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.cache_hits, 1);
    assert_eq!(storage.count(Table::Html).await.unwrap(), 2);
    assert_eq!(storage.count(Table::Page).await.unwrap(), 2);
}
