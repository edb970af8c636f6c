//! Global admission-governor token bucket.
//!
//! Unlike the corpus's adaptive per-domain `RateLimiter` (which backs off
//! on 429/503 and recovers on success), this is deliberately dumb: a single
//! shared bucket with a very short refill interval and a burst several
//! times the maximum worker count. It exists only to stop a pathological
//! fan-out, not to be polite to any one host — politeness is the per-page
//! delay in the fetch pipeline (`crawl::orchestrator`), not this limiter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    /// `refill_interval` is how often one token is added back;
    /// `burst` is both the starting and maximum number of tokens.
    pub fn new(refill_interval: Duration, burst: usize) -> Self {
        let semaphore = Arc::new(Semaphore::new(burst));
        let refill_target = semaphore.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refill_interval);
            loop {
                ticker.tick().await;
                if refill_target.available_permits() < burst {
                    refill_target.add_permits(1);
                }
            }
        });
        Self { semaphore }
    }

    /// Try to take one token within `timeout`. Proceeds even if the wait
    /// expires: the limiter is an admission ceiling, not a fairness
    /// mechanism, so a worker that couldn't get a permit in time still
    /// fetches rather than stalling indefinitely.
    pub async fn acquire(&self, timeout: Duration) {
        if let Ok(Ok(permit)) =
            tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await
        {
            permit.forget();
        }
    }
}
