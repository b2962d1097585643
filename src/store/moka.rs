use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use fieldx::fxstruct;
use moka::future::Cache;
use moka::Expiry;

use crate::error::StoreError;
use crate::traits::KeyValueStore;

#[derive(Clone)]
pub(crate) struct StoredValue {
    bytes: Arc<Vec<u8>>,
    ttl:   Duration,
}

// Every entry lives exactly as long as the TTL it was written with. Reads don't prolong it.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &StoredValue, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process store over a [moka](https://crates.io/crates/moka) future cache.
///
/// The store is unbounded unless `max_capacity` is given; entries disappear by their TTL. Useful for single-instance
/// deployments and for tests.
///
/// ```ignore
/// let store = MokaStore::builder().name("analytics").max_capacity(10_000).build()?;
/// ```
#[fxstruct(sync, no_new, builder)]
pub struct MokaStore {
    /// Store name. Most useful for debugging and logging.
    #[fieldx(get(copy), default("moka"))]
    name: &'static str,

    /// Maximum number of entries.
    #[fieldx(optional, get(copy))]
    max_capacity: u64,

    #[fieldx(lazy, private, get(clone), builder(off))]
    cache: Arc<Cache<String, StoredValue>>,
}

impl MokaStore {
    fn build_cache(&self) -> Arc<Cache<String, StoredValue>> {
        let mut builder = Cache::builder().name(self.name()).expire_after(PerEntryTtl);
        if let Some(max_capacity) = self.max_capacity() {
            builder = builder.max_capacity(max_capacity);
        }
        Arc::new(builder.build())
    }

    /// Number of live entries. Approximate, as moka applies pending maintenance lazily.
    pub fn entry_count(&self) -> u64 {
        self.cache().entry_count()
    }
}

impl Debug for MokaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStore")
            .field("name", &self.name())
            .field("max_capacity", &self.max_capacity())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for MokaStore {
    fn name(&self) -> &'static str {
        MokaStore::name(self)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.cache().get(key).await.map(|v| v.bytes.as_ref().clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.cache()
            .insert(
                key.to_string(),
                StoredValue {
                    bytes: Arc::new(value),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache().invalidate(key).await;
        Ok(())
    }

    async fn size_of(&self, key: &str) -> Result<Option<usize>, StoreError> {
        Ok(self.cache().get(key).await.map(|v| v.bytes.len()))
    }
}
