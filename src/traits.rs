use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;
use crate::error::StoreError;
use crate::key::CacheKey;

/// The key-value store the cache keeps its entries in.
///
/// Keys are the serialized [`CacheKey`] strings, values are opaque byte payloads. Expiry is entirely the store's
/// business: the cache hands over a TTL on write and interprets absence as "stale or never cached".
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Store name for diagnostics.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Deleting an absent key is a success.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Payload size of an entry, `None` if there is no entry under the key.
    ///
    /// The default implementation fetches the payload. Stores with a cheaper way of learning the size should override
    /// it.
    async fn size_of(&self, key: &str) -> Result<Option<usize>, StoreError> {
        Ok(self.get(key).await?.map(|bytes| bytes.len()))
    }
}

/// Telemetry collaborator of [`ResourceCache`](crate::ResourceCache).
///
/// All methods default to no-op.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    async fn on_hit(&self, _key: &CacheKey) {}
    async fn on_miss(&self, _key: &CacheKey) {}
    /// A cache failure that the request survived: store read/write failure, corrupt entry, etc.
    async fn on_degraded(&self, _error: &CacheError) {}
    /// Some or all keys of an invalidation request could not be confirmed deleted.
    async fn on_invalidation_failed(&self, _error: &CacheError) {}
}

/// Observer reporting through `tracing`. This is what [`ResourceCache`](crate::ResourceCache) uses unless told
/// otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn shared() -> Arc<dyn Observer> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Observer for TracingObserver {
    async fn on_hit(&self, key: &CacheKey) {
        tracing::trace!(%key, "cache hit");
    }

    async fn on_miss(&self, key: &CacheKey) {
        tracing::debug!(%key, "cache miss");
    }

    async fn on_degraded(&self, error: &CacheError) {
        tracing::warn!(%error, "cache degraded");
    }

    async fn on_invalidation_failed(&self, error: &CacheError) {
        tracing::warn!(%error, "cache invalidation failed, entries will expire by TTL");
    }
}
