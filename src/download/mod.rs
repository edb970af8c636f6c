//! Multi-NIC download engine: per-interface bounded queues, a shared
//! priority (retry) queue, and a worker pool that fetches documents bound
//! to a specific source IP and HTTP client.

mod queue;
mod rate_limiter;
pub mod scaler;
mod task;
mod worker;

pub use queue::BoundedQueue;
pub use rate_limiter::RateLimiter;
pub use task::{DownloadTask, Outcome};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::errors::DownloadError;
use crate::net::{InterfaceClientPool, NetworkInterface};

/// Tunables for the download manager, see `SPEC_FULL.md` §6 for defaults.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub max_queue_size: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub rate_limit_refill: Duration,
    pub rate_limit_burst: usize,
    pub initial_workers: usize,
    pub max_workers: usize,
    pub scale_threshold: f64,
    pub scale_step: usize,
    /// Number of independent `scale_loop` tasks run in parallel; each reads
    /// the same snapshot and may decide to add workers on the same tick, so
    /// queue pressure gets relieved faster than a single scaler could manage
    /// alone.
    pub scaler_count: usize,
    pub target_dir: PathBuf,
    /// When set, the performance sampler emits a `DownloadSnapshot` JSON
    /// line on each tick instead of a structured human-readable log line.
    pub stats_json: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 50_000,
            max_retries: 3,
            retry_backoff: Duration::from_millis(300),
            rate_limit_refill: Duration::from_micros(10),
            rate_limit_burst: 800 * 4,
            initial_workers: 100,
            max_workers: 800,
            scale_threshold: 0.40,
            scale_step: 300,
            scaler_count: 16,
            target_dir: PathBuf::from("."),
            stats_json: false,
        }
    }
}

/// Monotonic counters, readable without a lock.
#[derive(Default)]
pub struct DownloadStats {
    pub attempts: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub bytes_written: AtomicU64,
    pub active_workers: AtomicUsize,
}

/// Immutable snapshot handed to the monitor; never a live handle into the
/// manager's internals.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub bytes_written: u64,
    pub active_workers: usize,
    pub queued: usize,
    pub capacity: usize,
}

struct StateMaps {
    downloaded: HashSet<String>,
    pending: HashSet<String>,
    failed: HashMap<String, u32>,
}

impl StateMaps {
    fn new() -> Self {
        Self {
            downloaded: HashSet::new(),
            pending: HashSet::new(),
            failed: HashMap::new(),
        }
    }
}

/// Owns every piece of the multi-NIC download engine: interface client
/// pools, queues, state maps, counters, and the worker pool.
pub struct DownloadManager {
    interfaces: Vec<InterfaceClientPool>,
    interface_queues: Vec<BoundedQueue>,
    priority_queue: BoundedQueue,
    state: Mutex<StateMaps>,
    pub stats: DownloadStats,
    rate_limiter: RateLimiter,
    config: DownloadConfig,
    round_robin: AtomicUsize,
    log_tx: mpsc::UnboundedSender<String>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
}

impl DownloadManager {
    pub fn new(
        interfaces: Vec<InterfaceClientPool>,
        config: DownloadConfig,
        log_tx: mpsc::UnboundedSender<String>,
    ) -> Arc<Self> {
        let interface_count = interfaces.len().max(1);
        let per_interface_capacity = (config.max_queue_size / interface_count).max(1);
        let interface_queues = interfaces
            .iter()
            .map(|_| BoundedQueue::new(per_interface_capacity))
            .collect();
        let priority_queue = BoundedQueue::new(config.max_queue_size.max(1));
        let rate_limiter = RateLimiter::new(config.rate_limit_refill, config.rate_limit_burst);

        let manager = Arc::new(Self {
            interfaces,
            interface_queues,
            priority_queue,
            state: Mutex::new(StateMaps::new()),
            stats: DownloadStats::default(),
            rate_limiter,
            config,
            round_robin: AtomicUsize::new(0),
            log_tx,
            worker_handles: Mutex::new(Vec::new()),
            started_at: Instant::now(),
        });

        manager
    }

    /// Spawn the initial worker pool and every background sampler. Call
    /// once, right after construction.
    pub async fn start(self: &Arc<Self>) {
        let initial = self.config.initial_workers;
        self.add_workers(initial).await;
        scaler::spawn_all(Arc::clone(self));
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len().max(1)
    }

    async fn is_known(&self, url: &str) -> bool {
        let state = self.state.lock().await;
        state.downloaded.contains(url) || state.pending.contains(url)
    }

    async fn mark_pending(&self, url: &str) {
        let mut state = self.state.lock().await;
        state.pending.insert(url.to_string());
    }

    async fn mark_downloaded(&self, url: &str) {
        let mut state = self.state.lock().await;
        state.pending.remove(url);
        state.downloaded.insert(url.to_string());
    }

    async fn mark_failed(&self, url: &str, attempts: u32) {
        let mut state = self.state.lock().await;
        state.pending.remove(url);
        state.failed.insert(url.to_string(), attempts);
    }

    /// Assign a task to an interface queue by atomic round-robin, falling
    /// back to the priority queue if that interface's queue is full.
    /// Rejects outright (without touching `pending`) if the URL is already
    /// downloaded or in flight.
    pub async fn enqueue(&self, url: String, depth: u32) -> bool {
        if self.is_known(&url).await {
            return false;
        }

        let interface_id = self.round_robin.fetch_add(1, Ordering::Relaxed) % self.interface_count();
        let task = DownloadTask::new(url.clone(), depth, interface_id);

        let accepted = match self.interface_queues[interface_id].try_enqueue(task) {
            Ok(()) => true,
            Err(task) => self.priority_queue.try_enqueue(task).is_ok(),
        };

        if accepted {
            self.mark_pending(&url).await;
        }
        accepted
    }

    /// Bounded-retry, non-blocking admission for a URL the normal `enqueue`
    /// refused. Tries the priority queue first, then each interface queue
    /// in order, backing off linearly between attempts. Drops with a
    /// diagnostic log line after 50 attempts rather than blocking forever.
    pub async fn persistent_enqueue(&self, url: String, depth: u32) {
        if self.is_known(&url).await {
            return;
        }

        for attempt in 1..=50u32 {
            let interface_id =
                self.round_robin.fetch_add(1, Ordering::Relaxed) % self.interface_count();
            let task = DownloadTask::new(url.clone(), depth, interface_id);

            let accepted = match self.priority_queue.try_enqueue(task) {
                Ok(()) => true,
                Err(task) => {
                    let mut task = Some(task);
                    let mut ok = false;
                    for queue in &self.interface_queues {
                        let t = task.take().unwrap();
                        match queue.try_enqueue(t) {
                            Ok(()) => {
                                ok = true;
                                break;
                            }
                            Err(t) => task = Some(t),
                        }
                    }
                    ok
                }
            };

            if accepted {
                self.mark_pending(&url).await;
                return;
            }

            tokio::time::sleep(Duration::from_millis(50) * attempt).await;
        }

        warn!(
            url = %url,
            error = %DownloadError::QueueFull,
            "dropping download task after 50 persistent-enqueue attempts"
        );
    }

    fn log_download(&self, url: &str) {
        let _ = self.log_tx.send(url.to_string());
    }

    /// Spawn `n` more worker tasks, distributing them across interfaces
    /// proportionally to each interface's `target_worker_share`, cycling
    /// client indices within each interface's pool. `active_workers` only
    /// grows, matching the invariant that the scaler never removes workers.
    pub async fn add_workers(self: &Arc<Self>, n: usize) {
        if n == 0 {
            return;
        }
        let interfaces: Vec<NetworkInterface> =
            self.interfaces.iter().map(|pool| pool.interface.clone()).collect();
        let shares = crate::net::worker_shares(&interfaces, n);

        let mut handles = Vec::with_capacity(n);
        let mut client_cursor = vec![0usize; interfaces.len()];

        for (interface_id, count) in shares.into_iter().enumerate() {
            for _ in 0..count {
                let client_index = client_cursor[interface_id]
                    % self.interfaces[interface_id].clients.len().max(1);
                client_cursor[interface_id] += 1;

                let manager = Arc::clone(self);
                handles.push(tokio::spawn(worker::run(manager, interface_id, client_index)));
            }
        }

        self.worker_handles.lock().await.extend(handles);
        info!(added = n, "download worker pool scaled up");
    }

    /// Close every queue so drained workers exit, then wait for all of them
    /// to finish.
    pub async fn shutdown(self: &Arc<Self>) {
        self.priority_queue.close();
        for queue in &self.interface_queues {
            queue.close();
        }

        let handles = std::mem::take(&mut *self.worker_handles.lock().await);
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Immutable snapshot of every counter and queue-utilization figure,
    /// used by the monitor. Never hands out a live reference into the
    /// manager's state.
    pub async fn snapshot(&self) -> DownloadSnapshot {
        let mut queued = self.priority_queue.len().await;
        let mut capacity = self.priority_queue.capacity();
        for queue in &self.interface_queues {
            queued += queue.len().await;
            capacity += queue.capacity();
        }

        DownloadSnapshot {
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            successes: self.stats.successes.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            bytes_written: self.stats.bytes_written.load(Ordering::Relaxed),
            active_workers: self.stats.active_workers.load(Ordering::Relaxed),
            queued,
            capacity: capacity.max(1),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Replace any of `\/:*?"<>|` and NUL with `_`, then truncate to 200 chars
/// while preserving the file extension.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c => c,
        })
        .collect();

    if sanitized.chars().count() <= 200 {
        return sanitized;
    }

    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if ext.len() < 20 => {
            let budget = 200 - ext.len() - 1;
            let truncated_stem: String = stem.chars().take(budget).collect();
            format!("{truncated_stem}.{ext}")
        }
        _ => sanitized.chars().take(200).collect(),
    }
}

/// Derive a filename for a downloaded document: `Content-Disposition`
/// attachment filename, else the last URL path segment, else a
/// timestamp-based fallback.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    if let Some(name) = content_disposition {
        if !name.is_empty() {
            return sanitize_filename(name);
        }
    }

    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = without_query.rsplit('/').next().unwrap_or("");

    let name = if last_segment.is_empty() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!("download_{nanos}")
    } else {
        last_segment.to_string()
    };

    sanitize_filename(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ClientPoolConfig, InterfaceClientPool, LinkSpeed, NetworkInterface};
    use std::net::Ipv4Addr;

    fn one_interface_manager() -> Arc<DownloadManager> {
        let interface = NetworkInterface::new("lo", Ipv4Addr::LOCALHOST, LinkSpeed::Unknown);
        let pool = InterfaceClientPool::build(interface, &ClientPoolConfig::default(), 1);
        let (tx, _rx) = mpsc::unbounded_channel();
        DownloadManager::new(vec![pool], DownloadConfig::default(), tx)
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_accepted_at_most_once() {
        let manager = one_interface_manager();
        let first = manager.enqueue("https://a.b/doc.pdf".to_string(), 0).await;
        let second = manager.enqueue("https://a.b/doc.pdf".to_string(), 0).await;
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn downloaded_and_pending_are_disjoint() {
        let manager = one_interface_manager();
        manager.enqueue("https://a.b/doc.pdf".to_string(), 0).await;
        manager.mark_downloaded("https://a.b/doc.pdf").await;
        let state = manager.state.lock().await;
        assert!(state.downloaded.contains("https://a.b/doc.pdf"));
        assert!(!state.pending.contains("https://a.b/doc.pdf"));
    }

    #[test]
    fn sanitize_filename_replaces_forbidden_characters() {
        let name = sanitize_filename("a/b:c*d?e\"f<g>h|i\0j");
        assert!(!name.contains(['/', ':', '*', '?', '"', '<', '>', '|', '\0']));
    }

    #[test]
    fn sanitize_filename_truncates_preserving_extension() {
        let long_stem = "x".repeat(250);
        let name = sanitize_filename(&format!("{long_stem}.pdf"));
        assert!(name.len() <= 200);
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn derive_filename_prefers_content_disposition() {
        let name = derive_filename("https://a.b/x.pdf", Some("report.pdf"));
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn derive_filename_falls_back_to_last_path_segment() {
        let name = derive_filename("https://a.b/dir/report.pdf?x=1", None);
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn derive_filename_falls_back_to_timestamp_when_path_empty() {
        let name = derive_filename("https://a.b/", None);
        assert!(name.starts_with("download_"));
    }

    /// Every queue at capacity one and already full: `persistent_enqueue`
    /// must give up after its bounded number of attempts rather than stall
    /// forever. Time is paused and auto-advanced so the attempt/backoff
    /// schedule runs to completion without real wall-clock delay.
    #[tokio::test(start_paused = true)]
    async fn persistent_enqueue_gives_up_when_every_queue_stays_full() {
        let mut config = DownloadConfig::default();
        config.max_queue_size = 1;
        let interface = NetworkInterface::new("lo", Ipv4Addr::LOCALHOST, LinkSpeed::Unknown);
        let pool = InterfaceClientPool::build(interface, &ClientPoolConfig::default(), 1);
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = DownloadManager::new(vec![pool], config, tx);

        // Fill the only interface queue and the priority queue so every
        // admission attempt inside persistent_enqueue fails.
        assert!(manager
            .interface_queues[0]
            .try_enqueue(DownloadTask::new("https://a.b/blocker-1".to_string(), 0, 0))
            .is_ok());
        assert!(manager
            .priority_queue
            .try_enqueue(DownloadTask::new("https://a.b/blocker-2".to_string(), 0, 0))
            .is_ok());

        manager
            .persistent_enqueue("https://a.b/never-fits.pdf".to_string(), 0)
            .await;

        // Never admitted, so it was never marked pending and never consumed
        // the queue slots held by the blockers.
        assert!(!manager.is_known("https://a.b/never-fits.pdf").await);
    }
}
