//! Bounded, non-blocking task queues.
//!
//! Wraps a `tokio::sync::mpsc` bounded channel with `try_send`/`try_recv`
//! semantics on both ends, plus a capacity readout the auto-scaler uses to
//! compute utilization. The receiver is held behind a `try_lock`-only mutex
//! so "peek, don't block" is the only way workers interact with it.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, Mutex};

use super::task::DownloadTask;

pub struct BoundedQueue {
    tx: mpsc::Sender<DownloadTask>,
    rx: Mutex<mpsc::Receiver<DownloadTask>>,
    capacity: usize,
    closed: AtomicBool,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking enqueue. Rejected once the queue is closed or full.
    pub fn try_enqueue(&self, task: DownloadTask) -> Result<(), DownloadTask> {
        if self.closed.load(Ordering::Acquire) {
            return Err(task);
        }
        self.tx.try_send(task).map_err(|err| match err {
            mpsc::error::TrySendError::Full(t) => t,
            mpsc::error::TrySendError::Closed(t) => t,
        })
    }

    /// Non-blocking dequeue: if the receiver lock is contended or empty,
    /// this returns `None` immediately rather than waiting.
    pub fn try_dequeue(&self) -> Option<DownloadTask> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Current queued length, derived from the channel's unused capacity.
    pub async fn len(&self) -> usize {
        let rx = self.rx.lock().await;
        self.capacity - rx.capacity()
    }

    /// Mark the queue closed: further enqueues are rejected immediately.
    /// Already-queued tasks can still be drained by `try_dequeue`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closed and empty: nothing left for a worker to ever pull from this
    /// queue again.
    pub async fn is_drained(&self) -> bool {
        self.is_closed() && self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str) -> DownloadTask {
        DownloadTask::new(url.to_string(), 0, 0)
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let queue = BoundedQueue::new(4);
        queue.try_enqueue(task("https://a.b/1")).unwrap();
        assert_eq!(queue.len().await, 1);
        let got = queue.try_dequeue().unwrap();
        assert_eq!(got.url, "https://a.b/1");
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let queue = BoundedQueue::new(1);
        queue.try_enqueue(task("https://a.b/1")).unwrap();
        let rejected = queue.try_enqueue(task("https://a.b/2"));
        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn closed_queue_rejects_new_enqueues_but_drains_existing() {
        let queue = BoundedQueue::new(4);
        queue.try_enqueue(task("https://a.b/1")).unwrap();
        queue.close();
        assert!(queue.try_enqueue(task("https://a.b/2")).is_err());
        assert!(queue.try_dequeue().is_some());
        assert!(queue.is_drained().await);
    }
}
