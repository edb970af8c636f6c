//! Thin CLI entry point: parse flags, resolve interfaces, build the
//! orchestrator and download manager, run to completion, print stats.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use multicrawl::config::{resolve_interfaces, AppConfig, Cli};
use multicrawl::crawl::Orchestrator;
use multicrawl::download::DownloadManager;
use multicrawl::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let interfaces = resolve_interfaces();
    let config = AppConfig::from_cli(cli, interfaces)
        .context("startup configuration was invalid")?;

    let run_timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let log_handles = logging::spawn_writers(&config.target_dir, &run_timestamp);

    let interface_count = config.interfaces.len();
    let pools: Vec<_> = config
        .interfaces
        .iter()
        .cloned()
        .map(|interface| {
            multicrawl::net::InterfaceClientPool::build(interface, &config.client_pool, interface_count)
        })
        .collect();

    let downloads = DownloadManager::new(pools, config.download.clone(), log_handles.downloads_tx);
    downloads.start().await;

    let orchestrator = Orchestrator::new(
        config.interfaces.clone(),
        config.crawl.clone(),
        Arc::clone(&downloads),
        log_handles.visited_tx,
        log_handles.panics_tx,
    );

    let stats = orchestrator.run(config.seed_url.clone()).await;

    if config.stats_json {
        println!("{}", serde_json::to_string(&stats).context("failed to serialize run stats")?);
    } else {
        println!("crawl complete");
        println!("  pages processed:     {}", stats.pages_processed);
        println!("  panics recovered:    {}", stats.panics_recovered);
        println!("  download attempts:   {}", stats.download_attempts);
        println!("  download successes:  {}", stats.download_successes);
        println!("  download failures:   {}", stats.download_failures);
        println!("  bytes downloaded:    {}", stats.bytes_downloaded);
    }

    Ok(())
}
