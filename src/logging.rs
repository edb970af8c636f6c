//! Structured logging setup and the detached log-file writers.
//!
//! Three append-only files are fed by unbounded channels rather than a
//! shared file handle: `visitedURLs_<ts>.txt`, `downloads_<ts>.txt`, and
//! `panic_urls.txt`. Interleaving between concurrent senders is acceptable
//! since each record is one short line.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Per-module targets (e.g.
/// `RUST_LOG=multicrawl::crawl=debug,multicrawl::download=info`) are
/// controlled entirely through `EnvFilter`; this just wires it up.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();
}

/// Handles to the three unbounded log channels plus the timestamp used in
/// the two timestamped filenames.
pub struct LogHandles {
    pub visited_tx: mpsc::UnboundedSender<String>,
    pub downloads_tx: mpsc::UnboundedSender<String>,
    pub panics_tx: mpsc::UnboundedSender<String>,
}

/// Spawn the three detached append-writer tasks and return the channels
/// callers feed. `run_timestamp` seeds the two timestamped filenames; it is
/// passed in rather than computed here so it can be stamped once at
/// startup and reused consistently.
pub fn spawn_writers(target_dir: &std::path::Path, run_timestamp: &str) -> LogHandles {
    let (visited_tx, visited_rx) = mpsc::unbounded_channel();
    let (downloads_tx, downloads_rx) = mpsc::unbounded_channel();
    let (panics_tx, panics_rx) = mpsc::unbounded_channel();

    let visited_path = target_dir.join(format!("visitedURLs_{run_timestamp}.txt"));
    let downloads_path = target_dir.join(format!("downloads_{run_timestamp}.txt"));
    let panics_path = target_dir.join("panic_urls.txt");

    tokio::spawn(append_writer(visited_path, visited_rx));
    tokio::spawn(append_writer(downloads_path, downloads_rx));
    tokio::spawn(append_writer(panics_path, panics_rx));

    LogHandles {
        visited_tx,
        downloads_tx,
        panics_tx,
    }
}

async fn append_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<String>) {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await;

    let mut file = match file {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "could not open log file");
            return;
        }
    };

    while let Some(line) = rx.recv().await {
        let mut line = line;
        line.push('\n');
        if let Err(err) = file.write_all(line.as_bytes()).await {
            tracing::warn!(path = %path.display(), error = %err, "log write failed");
        }
    }
}
