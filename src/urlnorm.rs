//! URL normalization and document classification.
//!
//! `normalize` produces the dedup key used by the visit frontier; it is
//! intentionally lossy (fragment and query are dropped) since its only job
//! is to answer "have we fetched this resource before". `is_document` is a
//! cheap suffix test used to route a URL into the download manager instead
//! of the visit frontier.

use url::Url;

/// Canonicalize a URL for use as a dedup key: lowercase scheme, host, and
/// path; drop fragment and query.
pub fn normalize(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw).ok()?;
    parsed.set_fragment(None);
    parsed.set_query(None);

    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed.host_str()?.to_ascii_lowercase();
    let path = parsed.path().to_ascii_lowercase();

    let mut key = format!("{scheme}://{host}");
    if let Some(port) = parsed.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(&path);
    Some(key)
}

/// Return true if `url` should be treated as a document rather than a page
/// to keep crawling: it ends in one of `extensions`, or the extension is
/// immediately followed by `?` or `&` (so `report.pdf?download=1` still
/// classifies as a document even though normalization strips the query).
pub fn is_document(url: &str, extensions: &[String]) -> bool {
    let lower = url.to_ascii_lowercase();
    extensions.iter().any(|ext| {
        let ext = ext.to_ascii_lowercase();
        lower.ends_with(&ext)
            || lower.contains(&format!("{ext}?"))
            || lower.contains(&format!("{ext}&"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_fragment_and_query() {
        let a = normalize("https://Example.com/Path?x=1#frag").unwrap();
        let b = normalize("https://example.com/path").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("HTTPS://A.b/X/Y?q=1").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize("not a url").is_none());
    }

    #[test]
    fn is_document_matches_suffix() {
        let ext = vec![".pdf".to_string()];
        assert!(is_document("https://a.b/report.PDF", &ext));
        assert!(is_document("https://a.b/report.pdf?x=1", &ext));
        assert!(is_document("https://a.b/report.pdf&y=2", &ext));
        assert!(!is_document("https://a.b/report.pdf.html", &ext));
    }

    #[test]
    fn is_document_case_and_query_form_survive_normalization() {
        let ext = vec![".pdf".to_string()];
        let raw = "https://A.b/Report.PDF?x=1#y";
        let normalized = normalize(raw).unwrap();
        // Normalization strips the query, so the `.pdf?` query-form test
        // only ever applies to the raw URL, never to the normalized key.
        assert!(is_document(raw, &ext));
        assert!(is_document(&normalized, &ext));
    }
}
