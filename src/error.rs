//! Error taxonomy of the cache layer.
//!
//! Only [`CacheError::SourceUnavailable`] and the programming errors ([`CacheError::UnknownResourcePolicy`],
//! [`CacheError::InvalidKey`]) ever reach callers of [`ResourceCache::fetch`](crate::ResourceCache::fetch). Everything
//! else is a degradation: it is handed to the [`Observer`](crate::traits::Observer) and the request carries on without
//! the cache.

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use crate::key::CacheKey;

/// Type-erased error produced by a loader or a store backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single key-value store call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{store} timed out after {after:?}")]
    Timeout { store: &'static str, after: Duration },

    #[error("{store} is unreachable: {source}")]
    Unreachable {
        store:  &'static str,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    pub fn unreachable<E>(store: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Unreachable {
            store,
            source: source.into(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::unreachable("redis", err)
    }
}

/// The key-value store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Set,
    Delete,
    Stat,
}

impl Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Stat => "stat",
        })
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// The authoritative data could not be produced: the loader failed or timed out. During
    /// [`status`](crate::ResourceCache::status) this also means the key-value store itself could not be reached.
    #[error("source unavailable for '{key}': {source}")]
    SourceUnavailable {
        key:    String,
        #[source]
        source: BoxError,
    },

    /// Non-fatal. The read path degrades to the loader.
    #[error("cache unavailable on {op} of '{key}': {source}")]
    CacheUnavailable {
        key:    CacheKey,
        op:     StoreOp,
        #[source]
        source: StoreError,
    },

    /// The keys listed here were not confirmed deleted. The mutation that triggered the invalidation stands; the
    /// entries age out through their TTL.
    #[error("invalidation failed for {}", join_keys(.keys))]
    InvalidationFailed { keys: Vec<CacheKey> },

    #[error("no cache policy for {namespace}:{resource}{}", variant_suffix(.variant))]
    UnknownResourcePolicy {
        namespace: String,
        resource:  String,
        variant:   Option<String>,
    },

    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    /// A stored payload didn't deserialize into the requested type. Treated as a miss.
    #[error("corrupt cache entry '{key}': {source}")]
    CorruptEntry {
        key:    CacheKey,
        #[source]
        source: serde_json::Error,
    },

    /// A loader result couldn't be serialized for storage. The result is still returned.
    #[error("cannot encode value for '{key}': {source}")]
    Encoding {
        key:    CacheKey,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn source_unavailable<E>(key: impl ToString, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::SourceUnavailable {
            key:    key.to_string(),
            source: source.into(),
        }
    }

    /// `true` for errors which the cache absorbs instead of failing the request.
    pub fn is_degradation(&self) -> bool {
        matches!(
            self,
            Self::CacheUnavailable { .. }
                | Self::InvalidationFailed { .. }
                | Self::CorruptEntry { .. }
                | Self::Encoding { .. }
        )
    }

    /// `true` for misuse of the cache API, i.e. bugs in the calling code.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::UnknownResourcePolicy { .. } | Self::InvalidKey(_))
    }
}

fn variant_suffix(variant: &Option<String>) -> String {
    variant.as_ref().map(|v| format!(" (variant '{v}')")).unwrap_or_default()
}

fn join_keys(keys: &[CacheKey]) -> String {
    keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
