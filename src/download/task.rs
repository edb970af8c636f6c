//! Download task and its terminal state machine.

/// A document queued for download. Immutable once accepted by a queue,
/// except `retry` and `priority`, which are set when re-enqueued on
/// failure.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub depth: u32,
    pub retry: u32,
    pub priority: bool,
    pub interface_id: usize,
}

impl DownloadTask {
    pub fn new(url: String, depth: u32, interface_id: usize) -> Self {
        Self {
            url,
            depth,
            retry: 0,
            priority: false,
            interface_id,
        }
    }

    /// Produce the next attempt of this task after a failure: bumped retry
    /// count, marked priority so it goes through the retry queue.
    pub fn next_attempt(&self) -> Self {
        Self {
            url: self.url.clone(),
            depth: self.depth,
            retry: self.retry + 1,
            priority: true,
            interface_id: self.interface_id,
        }
    }
}

/// Outcome of one dequeue-fetch-write cycle, used by the manager to drive
/// the state-map transition. Every task dequeued is terminated in exactly
/// one of these.
#[derive(Debug)]
pub enum Outcome {
    Success { bytes_written: u64 },
    Retry(DownloadTask),
    Failed { attempts: u32 },
}
