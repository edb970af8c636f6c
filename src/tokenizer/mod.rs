//! Two-tier HTML tokenizer: a routing coordinator in front of the byte-level
//! fast path and the DOM-based slow path.

pub mod fast;
pub mod slow;

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use url::Url;

pub use fast::FastPageResult;
pub use slow::{DocumentRecord, PageMetadata, SlowPageResult};

use crate::errors::TokenizeError;

/// Which path the coordinator picked for a page, and why. Exposed so tests
/// can assert against the routing table directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Fast,
    Slow,
}

const SLOW_PATH_KEYWORDS: &[&str] = &["/document", "/paper", "/publication", "/research", "/library"];
const FAST_PATH_KEYWORDS: &[&str] = &["/sitemap", "/archive", "/category", "/tag", "/index", "/list"];

/// Decide fast vs slow for a page, before either tokenizer runs.
///
/// Rules are evaluated top to bottom; the first match wins. See the
/// module-level routing table in the project's design docs for the
/// decision oracle this function must satisfy.
pub fn route(url: &str, body_size: usize, fast_path_limit: usize, slow_path_limit: usize) -> Route {
    let path_lower = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    let has_query = Url::parse(url)
        .map(|u| u.query().is_some_and(|q| !q.is_empty()))
        .unwrap_or(false);

    if body_size > slow_path_limit {
        return Route::Slow;
    }
    if SLOW_PATH_KEYWORDS.iter().any(|kw| path_lower.contains(kw)) {
        return Route::Slow;
    }
    if has_query {
        return Route::Slow;
    }
    if body_size < fast_path_limit {
        return Route::Fast;
    }
    if FAST_PATH_KEYWORDS.iter().any(|kw| path_lower.contains(kw)) {
        return Route::Fast;
    }
    let segment_count = path_lower.split('/').filter(|s| !s.is_empty()).count();
    if segment_count <= 3 {
        return Route::Fast;
    }
    Route::Slow
}

/// Combined counters from both tokenizers plus routing tallies. All fields
/// are atomics so a monitor can read them without taking a lock.
#[derive(Default)]
pub struct TokenizerStats {
    pub fast_count: AtomicU64,
    pub slow_count: AtomicU64,
    pub pages_processed: AtomicU64,
    pub total_latency_micros: AtomicU64,
    pub links_extracted: AtomicU64,
    pub documents_detected: AtomicU64,
}

impl TokenizerStats {
    fn record_fast(&self, result: &FastPageResult) {
        self.fast_count.fetch_add(1, Ordering::Relaxed);
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros
            .fetch_add(result.scan_latency_micros, Ordering::Relaxed);
        self.links_extracted
            .fetch_add(result.urls.len() as u64, Ordering::Relaxed);
    }

    fn record_slow(&self, result: &SlowPageResult) {
        self.slow_count.fetch_add(1, Ordering::Relaxed);
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros
            .fetch_add(result.scan_latency_micros, Ordering::Relaxed);
        self.links_extracted
            .fetch_add(result.urls.len() as u64, Ordering::Relaxed);
        self.documents_detected
            .fetch_add(result.documents.len() as u64, Ordering::Relaxed);
    }
}

/// Normalized output of either tokenizer path, so the orchestrator doesn't
/// need to match on which path ran.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub urls: Vec<String>,
    pub documents: Vec<DocumentRecord>,
}

impl From<FastPageResult> for PageResult {
    fn from(fast: FastPageResult) -> Self {
        PageResult {
            urls: fast.urls,
            documents: Vec::new(),
        }
    }
}

impl From<SlowPageResult> for PageResult {
    fn from(slow: SlowPageResult) -> Self {
        PageResult {
            urls: slow.urls,
            documents: slow.documents,
        }
    }
}

/// Owns routing counters and forwards per-path statistics.
pub struct Coordinator {
    pub stats: TokenizerStats,
    pub fast_path_limit: usize,
    pub slow_path_limit: usize,
    pub doc_extensions: Vec<String>,
}

impl Coordinator {
    pub fn new(fast_path_limit: usize, slow_path_limit: usize, doc_extensions: Vec<String>) -> Self {
        Self {
            stats: TokenizerStats::default(),
            fast_path_limit,
            slow_path_limit,
            doc_extensions,
        }
    }

    /// Route and tokenize a page in one call. A page whose base URL doesn't
    /// parse, or whose body is empty, never reaches either tokenizer path:
    /// both conditions are caught here as a `TokenizeError`, logged, and
    /// degraded to an empty result without being counted as processed.
    pub fn tokenize(&self, url: &str, body: &[u8]) -> PageResult {
        if let Err(err) = Url::parse(url) {
            debug!(url = %url, error = %TokenizeError::from(err), "tokenizer degrading to empty result");
            return PageResult::default();
        }
        if body.is_empty() {
            debug!(url = %url, error = %TokenizeError::EmptyDocument, "tokenizer degrading to empty result");
            return PageResult::default();
        }

        match route(url, body.len(), self.fast_path_limit, self.slow_path_limit) {
            Route::Fast => {
                let result = fast::scan(body, url);
                self.stats.record_fast(&result);
                result.into()
            }
            Route::Slow => {
                let text = String::from_utf8_lossy(body);
                let result = slow::analyze(&text, url, &self.doc_extensions);
                self.stats.record_slow(&result);
                result.into()
            }
        }
    }
}
