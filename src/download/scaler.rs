//! Auto-scaling and periodic samplers for the download engine.
//!
//! Four independent background loops, spawned once and left running for the
//! life of the manager: a queue-utilization scaler (tight cadence), a
//! throughput sampler, a memory-pressure sampler, and a network sampler.
//! None of them hold a lock across an await point longer than a single
//! counter read.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::DownloadManager;

const SCALER_INTERVAL: Duration = Duration::from_millis(500);
const PERFORMANCE_INTERVAL: Duration = Duration::from_secs(3);
const MEMORY_INTERVAL: Duration = Duration::from_secs(20);
const NETWORK_INTERVAL: Duration = Duration::from_secs(15);

/// Multiplier tiers applied to `scale_step` above the base scale threshold,
/// checked from the highest down. Below all of these (but still above the
/// base threshold) the plain step applies.
const SCALE_MULTIPLIER_TIERS: &[(f64, usize)] = &[(0.80, 4), (0.60, 2)];

/// Spawn every sampler task. Returns immediately; the tasks run detached for
/// the manager's lifetime and stop only when their `Arc` is the last one
/// dropped.
///
/// `scale_loop` is spawned `manager.config.scaler_count` times rather than
/// once: each copy reads the same snapshot independently and may decide to
/// add workers on the same tick, so a sudden queue spike gets relieved by
/// several redundant observers racing to react instead of waiting on one.
/// `add_workers` and `snapshot` are safe to call concurrently from any
/// number of callers, so the copies need no coordination between them.
pub fn spawn_all(manager: Arc<DownloadManager>) {
    for _ in 0..manager.config.scaler_count.max(1) {
        tokio::spawn(scale_loop(Arc::clone(&manager)));
    }
    tokio::spawn(performance_loop(Arc::clone(&manager)));
    tokio::spawn(memory_loop(Arc::clone(&manager)));
    tokio::spawn(network_loop(manager));
}

async fn scale_loop(manager: Arc<DownloadManager>) {
    let mut ticker = tokio::time::interval(SCALER_INTERVAL);
    loop {
        ticker.tick().await;
        let snapshot = manager.snapshot().await;
        let utilization = snapshot.queued as f64 / snapshot.capacity as f64;

        let active = manager.stats.active_workers.load(Ordering::Relaxed);
        let add = compute_scale_add(
            utilization,
            manager.config.scale_threshold,
            manager.config.scale_step,
            active,
            manager.config.max_workers,
        );
        if add > 0 {
            info!(utilization, add, "scaling download workers up");
            manager.add_workers(add).await;
        }
    }
}

/// How many workers to add this tick, given current queue utilization and
/// worker headroom. Zero whenever utilization sits at or below the base
/// threshold, or the pool is already at `max_workers`.
fn compute_scale_add(utilization: f64, scale_threshold: f64, scale_step: usize, active: usize, max_workers: usize) -> usize {
    if active >= max_workers || utilization <= scale_threshold {
        return 0;
    }

    let multiplier = SCALE_MULTIPLIER_TIERS
        .iter()
        .find(|&&(threshold, _)| utilization > threshold)
        .map(|&(_, multiplier)| multiplier)
        .unwrap_or(1);

    let headroom = max_workers.saturating_sub(active);
    (scale_step * multiplier).min(headroom)
}

async fn performance_loop(manager: Arc<DownloadManager>) {
    let mut ticker = tokio::time::interval(PERFORMANCE_INTERVAL);
    let mut last_bytes = 0u64;
    loop {
        ticker.tick().await;
        let snapshot = manager.snapshot().await;
        let delta = snapshot.bytes_written.saturating_sub(last_bytes);
        last_bytes = snapshot.bytes_written;
        let throughput_kbps = (delta as f64 / 1024.0) / PERFORMANCE_INTERVAL.as_secs_f64();

        if manager.config.stats_json {
            match serde_json::to_string(&snapshot) {
                Ok(line) => info!(stats_json = %line, "download stats snapshot"),
                Err(err) => warn!(error = %err, "failed to serialize stats snapshot"),
            }
            continue;
        }

        info!(
            throughput_kbps,
            successes = snapshot.successes,
            failures = snapshot.failures,
            active_workers = snapshot.active_workers,
            "download throughput sample"
        );
    }
}

/// Reads `/proc/self/statm` on Linux; logs a heap-pressure warning instead
/// of forcing a GC, since Rust has no runtime to ask for one.
async fn memory_loop(manager: Arc<DownloadManager>) {
    let mut ticker = tokio::time::interval(MEMORY_INTERVAL);
    loop {
        ticker.tick().await;
        if let Some(resident_pages) = read_statm_resident() {
            let resident_mb = resident_pages * page_size_kb() / 1024;
            let active_workers = manager.stats.active_workers.load(Ordering::Relaxed);
            if resident_mb > 4096 {
                warn!(resident_mb, active_workers, "resident set size exceeds heap-pressure threshold");
            } else {
                info!(resident_mb, active_workers, "memory sample");
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn read_statm_resident() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = contents.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages)
}

#[cfg(not(target_os = "linux"))]
fn read_statm_resident() -> Option<u64> {
    None
}

fn page_size_kb() -> u64 {
    4
}

async fn network_loop(manager: Arc<DownloadManager>) {
    let mut ticker = tokio::time::interval(NETWORK_INTERVAL);
    loop {
        ticker.tick().await;
        let snapshot = manager.snapshot().await;
        info!(
            interfaces = manager.interface_count(),
            queued = snapshot.queued,
            capacity = snapshot.capacity,
            "network sample"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_multiplier_tiers_are_ordered_descending() {
        for pair in SCALE_MULTIPLIER_TIERS.windows(2) {
            assert!(pair[0].0 > pair[1].0);
        }
    }

    #[test]
    fn below_threshold_adds_nothing() {
        assert_eq!(compute_scale_add(0.40, 0.40, 300, 100, 800), 0);
        assert_eq!(compute_scale_add(0.10, 0.40, 300, 100, 800), 0);
    }

    #[test]
    fn moderate_utilization_scales_by_two_times_step() {
        // utilization strictly between 0.60 and 0.80 -> 2x multiplier tier.
        assert_eq!(compute_scale_add(0.70, 0.40, 300, 100, 800), 600);
    }

    #[test]
    fn high_utilization_scales_by_four_times_step() {
        assert_eq!(compute_scale_add(0.90, 0.40, 300, 100, 800), 1200);
    }

    #[test]
    fn scale_add_is_capped_by_headroom_to_max_workers() {
        assert_eq!(compute_scale_add(0.90, 0.40, 300, 750, 800), 50);
    }

    #[test]
    fn already_at_max_workers_adds_nothing() {
        assert_eq!(compute_scale_add(0.95, 0.40, 300, 800, 800), 0);
    }
}
