//! Deduplicating visit frontier.
//!
//! A read-mostly lock guards a single `HashSet` of normalized URLs. `visit`
//! races by design: a check-then-insert under separate critical sections can
//! let two tasks both see "not visited" for the same URL, so it is meant to
//! be racy: double insertion is idempotent, and the worst case is one extra
//! fetch of the same page.

use std::collections::HashSet;

use tokio::sync::RwLock;

pub struct Frontier {
    visited: RwLock<HashSet<String>>,
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            visited: RwLock::new(HashSet::new()),
        }
    }

    /// Returns `true` if `key` had not been seen before and is now recorded.
    pub async fn visit(&self, key: &str) -> bool {
        {
            let visited = self.visited.read().await;
            if visited.contains(key) {
                return false;
            }
        }
        let mut visited = self.visited.write().await;
        visited.insert(key.to_string())
    }

    pub async fn len(&self) -> usize {
        self.visited.read().await.len()
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}
