//! Conditional-request validator store
//!
//! Static assets are fetched with conditional retrieval: validators observed
//! on a full response are replayed on the next request for the same path, and
//! a 304 is then accepted as equivalent to a 200.

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, ETAG, LAST_MODIFIED};
use std::collections::HashMap;

/// Validators remembered for one path
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    /// Entity tag from the last full response
    pub etag: Option<String>,

    /// Last-Modified from the last full response
    pub last_modified: Option<String>,
}

impl CacheEntry {
    /// Whether any validator is present
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Per-session store of conditional-request validators, keyed by request path
#[derive(Debug, Default)]
pub struct CacheSet {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CacheSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validators stored for `path`, if any
    pub fn get(&self, path: &str) -> Option<CacheEntry> {
        let entries = self.entries.lock();
        entries.get(path).filter(|e| !e.is_empty()).cloned()
    }

    /// Remember the validators carried by a full response for `path`
    pub fn store(&self, path: &str, headers: &HeaderMap) {
        let entry = CacheEntry {
            etag: headers
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            last_modified: headers
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        };

        if entry.is_empty() {
            return;
        }

        let mut entries = self.entries.lock();
        entries.insert(path.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_store_and_get() {
        let cache = CacheSet::new();
        assert!(cache.get("/css/app.css").is_none());

        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"abc123\""));
        cache.store("/css/app.css", &headers);

        let entry = cache.get("/css/app.css").unwrap();
        assert_eq!(entry.etag.as_deref(), Some("\"abc123\""));
        assert!(entry.last_modified.is_none());
    }

    #[test]
    fn test_response_without_validators_is_not_stored() {
        let cache = CacheSet::new();
        cache.store("/js/app.js", &HeaderMap::new());
        assert!(cache.get("/js/app.js").is_none());
    }
}
