//! The per-(interface, client) worker loop.
//!
//! Each worker owns one interface id and one client index into that
//! interface's pool for its whole lifetime; it never migrates. It drains the
//! shared priority queue first, then its own interface queue, sleeping
//! briefly when both are empty rather than blocking on either.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::task::{DownloadTask, Outcome};
use super::DownloadManager;
use crate::errors::DownloadError;
use crate::net;

const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_millis(1);
const RATE_LIMIT_TIMEOUT: Duration = Duration::from_millis(50);

pub(super) async fn run(manager: Arc<DownloadManager>, interface_id: usize, client_index: usize) {
    manager.stats.active_workers.fetch_add(1, Ordering::Relaxed);

    loop {
        let task = manager.priority_queue.try_dequeue().or_else(|| {
            manager.interface_queues[interface_id].try_dequeue()
        });

        let Some(task) = task else {
            let priority_drained = manager.priority_queue.is_drained().await;
            let interface_drained = manager.interface_queues[interface_id].is_drained().await;
            if priority_drained && interface_drained {
                break;
            }
            tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
            continue;
        };

        manager.rate_limiter.acquire(RATE_LIMIT_TIMEOUT).await;
        let outcome = attempt(&manager, interface_id, client_index, &task).await;

        match outcome {
            Outcome::Success { bytes_written } => {
                manager.stats.successes.fetch_add(1, Ordering::Relaxed);
                manager
                    .stats
                    .bytes_written
                    .fetch_add(bytes_written, Ordering::Relaxed);
                manager.mark_downloaded(&task.url).await;
                manager.log_download(&task.url);
            }
            Outcome::Retry(next) => {
                let backoff = manager.config.retry_backoff * next.retry;
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    tokio::time::sleep(backoff).await;
                    let interface_id = next.interface_id;
                    if let Err(next) = manager.priority_queue.try_enqueue(next) {
                        let _ = manager.interface_queues[interface_id].try_enqueue(next);
                    }
                });
            }
            Outcome::Failed { attempts } => {
                manager.stats.failures.fetch_add(1, Ordering::Relaxed);
                manager.mark_failed(&task.url, attempts).await;
                warn!(url = %task.url, attempts, "download permanently failed");
            }
        }
    }

    manager.stats.active_workers.fetch_sub(1, Ordering::Relaxed);
}

async fn attempt(
    manager: &Arc<DownloadManager>,
    interface_id: usize,
    client_index: usize,
    task: &DownloadTask,
) -> Outcome {
    manager.stats.attempts.fetch_add(1, Ordering::Relaxed);

    match fetch_and_write(manager, interface_id, client_index, task).await {
        Ok(bytes_written) => Outcome::Success { bytes_written },
        Err(err) => {
            debug!(url = %task.url, error = %err, "download attempt failed");
            next_outcome(task, manager.config.max_retries)
        }
    }
}

/// Fetch `task.url` and write its body to disk, propagating every failure
/// mode as a `DownloadError` instead of degrading inline; `attempt` is the
/// sole place that turns a `DownloadError` into a retry/fail decision.
async fn fetch_and_write(
    manager: &Arc<DownloadManager>,
    interface_id: usize,
    client_index: usize,
    task: &DownloadTask,
) -> Result<u64, DownloadError> {
    let client = manager.interfaces[interface_id].client(client_index);
    let response = net::fetch(client, &task.url).await?;

    if !response.is_success() {
        return Err(DownloadError::Status(response.status.as_u16()));
    }

    let filename = super::derive_filename(&task.url, response.content_disposition_filename().as_deref());
    let path = manager.config.target_dir.join(&filename);

    let bytes = response.bytes().await?;
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|err| DownloadError::Io(path.clone(), err))?;

    Ok(bytes.len() as u64)
}

fn next_outcome(task: &DownloadTask, max_retries: u32) -> Outcome {
    if task.retry < max_retries {
        Outcome::Retry(task.next_attempt())
    } else {
        Outcome::Failed {
            attempts: task.retry + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_outcome_retries_below_max() {
        let task = DownloadTask::new("https://example.com/a.pdf".to_string(), 0, 0);
        match next_outcome(&task, 3) {
            Outcome::Retry(next) => {
                assert_eq!(next.retry, 1);
                assert_eq!(next.url, task.url);
            }
            other => panic!("expected Retry, got {other:?}"),
        }
    }

    #[test]
    fn next_outcome_fails_at_max_retries() {
        let mut task = DownloadTask::new("https://example.com/a.pdf".to_string(), 0, 0);
        task.retry = 3;
        match next_outcome(&task, 3) {
            Outcome::Failed { attempts } => assert_eq!(attempts, 4),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn retry_escalation_reaches_failed_after_exactly_max_retries_plus_one_attempts() {
        let mut task = DownloadTask::new("https://example.com/a.pdf".to_string(), 0, 0);
        let max_retries = 3;
        let mut attempts_made = 0u32;

        loop {
            attempts_made += 1;
            match next_outcome(&task, max_retries) {
                Outcome::Retry(next) => task = next,
                Outcome::Failed { attempts } => {
                    assert_eq!(attempts, max_retries + 1);
                    break;
                }
                Outcome::Success { .. } => unreachable!(),
            }
        }

        assert_eq!(attempts_made, max_retries + 1);
    }
}
