//! DOM-based extraction: accurate but slower than the byte scanner.
//!
//! Grounded on the `scraper`-based link extraction the corpus uses for its
//! own BFS discovery crawl, generalized here to also collect page metadata
//! and document records in a single pass over the parsed tree.

use std::time::Instant;

use scraper::{Html, Selector};
use url::Url;

use crate::urlnorm;

/// A document-like link found while walking the DOM, with enough
/// surrounding context to be useful without re-fetching the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub url: String,
    pub extension: String,
    pub anchor_text: String,
    pub surrounding_context: String,
}

/// Cheap page-level signals a crawler can use for prioritization or
/// reporting, gathered for free while extracting links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: String,
    pub meta_description: String,
    pub link_density: f64,
    pub has_nav: bool,
}

/// Result of a slow-path scan.
#[derive(Debug, Clone, Default)]
pub struct SlowPageResult {
    pub urls: Vec<String>,
    pub documents: Vec<DocumentRecord>,
    pub metadata: PageMetadata,
    pub scan_latency_micros: u64,
}

const CONTEXT_LIMIT: usize = 200;

fn truncate_context(text: &str) -> String {
    if text.chars().count() <= CONTEXT_LIMIT {
        return text.to_string();
    }
    let truncated: String = text.chars().take(CONTEXT_LIMIT).collect();
    format!("{truncated}…")
}

fn extension_of(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('.')
        .next()
        .filter(|ext| !ext.contains('/'))
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn should_skip(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    href.trim().is_empty()
        || lower.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
}

/// Parse `body` (as the page found at `base_url`) and extract links,
/// document records, and metadata. Never panics: a parse that yields no
/// usable root still returns an empty result with latency recorded, so the
/// pipeline degrades rather than fails (see crate-level panic guard docs).
pub fn analyze(body: &str, base_url: &str, doc_extensions: &[String]) -> SlowPageResult {
    let start = Instant::now();
    let document = Html::parse_document(body);

    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => {
            return SlowPageResult {
                scan_latency_micros: start.elapsed().as_micros() as u64,
                ..Default::default()
            }
        }
    };

    let title_selector = Selector::parse("title").unwrap();
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();

    let meta_selector = Selector::parse(r#"meta[name="description" i]"#).unwrap();
    let meta_description = document
        .select(&meta_selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .unwrap_or_default()
        .to_string();

    let nav_selector = Selector::parse("nav").unwrap();
    let has_nav = document.select(&nav_selector).next().is_some();

    let anchor_selector = Selector::parse("a[href]").unwrap();
    let mut urls = Vec::new();
    let mut documents = Vec::new();

    for anchor in document.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if should_skip(href) {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let resolved = resolved.to_string();
        urls.push(resolved.clone());

        if urlnorm::is_document(&resolved, doc_extensions) {
            let anchor_text: String = anchor.text().collect::<String>().trim().to_string();
            let context = anchor
                .parent()
                .and_then(scraper::ElementRef::wrap)
                .map(|parent| parent.text().collect::<String>())
                .unwrap_or_else(|| anchor_text.clone());

            documents.push(DocumentRecord {
                url: resolved,
                extension: extension_of(href),
                anchor_text,
                surrounding_context: truncate_context(context.trim()),
            });
        }
    }

    let link_density = if body.is_empty() {
        0.0
    } else {
        urls.len() as f64 / (body.len() as f64 / 1024.0)
    };

    SlowPageResult {
        urls,
        documents,
        metadata: PageMetadata {
            title,
            meta_description,
            link_density,
            has_nav,
        },
        scan_latency_micros: start.elapsed().as_micros() as u64,
    }
}
