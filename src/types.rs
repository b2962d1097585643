use serde::Serialize;

use crate::key::CacheKey;

/// Where a value returned by [`ResourceCache::fetch_with_source`](crate::ResourceCache::fetch_with_source) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    Hit,
    /// Cache miss, the value was loaded and stored.
    Loaded,
    /// The cache failed on read or write; the value came from the loader.
    Degraded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<V> {
    pub value:  V,
    pub source: CacheSource,
}

impl<V> Fetched<V> {
    pub fn into_value(self) -> V {
        self.value
    }

    pub fn is_hit(&self) -> bool {
        self.source == CacheSource::Hit
    }
}

/// Outcome of an invalidation where at least one key was confirmed deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub deleted: Vec<CacheKey>,
    pub failed:  Vec<CacheKey>,
}

impl InvalidationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Cache state of a single key as reported by [`ResourceCache::status`](crate::ResourceCache::status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub key:        CacheKey,
    pub exists:     bool,
    pub size_bytes: usize,
}

impl StatusEntry {
    pub fn label(&self) -> String {
        self.key.label()
    }
}
