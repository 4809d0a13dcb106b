//! Decoded-result memoization keyed by resolved source URL.

use dashmap::DashMap;

/// Unbounded, process-lifetime map from source URL to decoded data URL.
///
/// There is no eviction and no invalidation: a URL's bytes are assumed not to
/// change while the process runs. Writers are expected to store each key once.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<String, String>,
}

impl ResultCache {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, url: &str) -> Option<String> {
        self.entries.get(url).map(|entry| entry.value().clone())
    }

    /// Store a decoded result. Overwrites an existing entry.
    #[inline]
    pub fn put(&self, url: impl Into<String>, data_url: impl Into<String>) {
        self.entries.insert(url.into(), data_url.into());
    }

    #[inline]
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
