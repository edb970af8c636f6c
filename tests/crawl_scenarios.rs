//! Black-box end-to-end scenarios driven against a mock HTTP server: the
//! orchestrator's depth cap and the download manager's enqueue dedup.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use multicrawl::crawl::{CrawlConfig, Orchestrator};
use multicrawl::download::{DownloadConfig, DownloadManager};
use multicrawl::net::{ClientPoolConfig, InterfaceClientPool, LinkSpeed, NetworkInterface};

fn loopback_interfaces() -> Vec<NetworkInterface> {
    vec![NetworkInterface::new("lo", Ipv4Addr::LOCALHOST, LinkSpeed::Unknown)]
}

fn test_crawl_config() -> CrawlConfig {
    CrawlConfig {
        polite_delay: Duration::from_millis(1),
        polite_jitter: Duration::from_millis(1),
        request_timeout: Duration::from_secs(5),
        ..CrawlConfig::default()
    }
}

async fn build_orchestrator(target_dir: &std::path::Path, max_depth: u32) -> Arc<Orchestrator> {
    let interfaces = loopback_interfaces();
    let pool = InterfaceClientPool::build(interfaces[0].clone(), &ClientPoolConfig::default(), 1);

    let (download_log_tx, _download_log_rx) = mpsc::unbounded_channel();
    let mut download_config = DownloadConfig::default();
    download_config.target_dir = target_dir.to_path_buf();
    download_config.initial_workers = 4;
    let downloads = DownloadManager::new(vec![pool], download_config, download_log_tx);
    downloads.start().await;

    let (visited_tx, _visited_rx) = mpsc::unbounded_channel();
    let (panic_tx, _panic_rx) = mpsc::unbounded_channel();

    let mut crawl_config = test_crawl_config();
    crawl_config.max_depth = max_depth;

    Orchestrator::new(interfaces, crawl_config, downloads, visited_tx, panic_tx)
}

/// A page at the depth limit links to another page one hop past it; that
/// page must never be fetched.
#[tokio::test]
async fn depth_limit_stops_fetching_beyond_max_depth() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let seed_html = format!(r#"<a href="{base}/level1">next</a>"#);
    let level1_html = format!(r#"<a href="{base}/level2">too far</a>"#);

    let seed_mock = server
        .mock("GET", "/seed")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(seed_html)
        .create_async()
        .await;
    let level1_mock = server
        .mock("GET", "/level1")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(level1_html)
        .create_async()
        .await;
    let level2_mock = server
        .mock("GET", "/level2")
        .expect(0)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html></html>")
        .create_async()
        .await;

    let target_dir = TempDir::new().expect("tempdir");
    // max_depth=1: the seed is depth 0, level1 (depth 1) is within budget,
    // level2 would be depth 2 and must be skipped.
    let orchestrator = build_orchestrator(target_dir.path(), 1).await;

    let stats = orchestrator.run(format!("{base}/seed")).await;

    seed_mock.assert_async().await;
    level1_mock.assert_async().await;
    level2_mock.assert_async().await;
    assert_eq!(stats.pages_processed, 2);
}

/// Two distinct pages link to the same document URL; the download manager
/// must admit exactly one attempt for it.
#[tokio::test]
async fn duplicate_document_links_yield_one_download_attempt() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    // "/research/..." routes through the slow (DOM) tokenizer path, the
    // only one that detects document links.
    let seed_html = format!(
        r#"<a href="{base}/research/a">a</a><a href="{base}/research/b">b</a>"#
    );
    let shared_doc_url = format!("{base}/research/shared.pdf");
    let page_html = format!(r#"<a href="{shared_doc_url}">report</a>"#);

    let seed_mock = server
        .mock("GET", "/research/seed")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(seed_html)
        .create_async()
        .await;
    let a_mock = server
        .mock("GET", "/research/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_html.clone())
        .create_async()
        .await;
    let b_mock = server
        .mock("GET", "/research/b")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_html)
        .create_async()
        .await;
    let doc_mock = server
        .mock("GET", "/research/shared.pdf")
        .expect(1)
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body("%PDF-1.4 test content")
        .create_async()
        .await;

    let target_dir = TempDir::new().expect("tempdir");
    let orchestrator = build_orchestrator(target_dir.path(), 13).await;

    let stats = orchestrator.run(format!("{base}/research/seed")).await;

    seed_mock.assert_async().await;
    a_mock.assert_async().await;
    b_mock.assert_async().await;
    doc_mock.assert_async().await;
    assert_eq!(stats.pages_processed, 3);
    assert_eq!(stats.download_attempts, 1);
    assert_eq!(stats.download_successes, 1);
}
