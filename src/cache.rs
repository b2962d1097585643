use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fieldx::fxstruct;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use crate::error::BoxError;
use crate::error::CacheError;
use crate::error::Result;
use crate::error::StoreError;
use crate::error::StoreOp;
use crate::key::CacheKey;
use crate::key::OwnerId;
use crate::policy::PolicyTable;
use crate::traits::KeyValueStore;
use crate::traits::Observer;
use crate::traits::TracingObserver;
use crate::types::CacheSource;
use crate::types::Fetched;
use crate::types::InvalidationReport;
use crate::types::StatusEntry;

/// Cache-aside controller over a [`KeyValueStore`].
///
/// ```ignore
/// let cache = ResourceCache::builder()
///     .store(Arc::new(RedisStore::connect("redis://cache:6379").await?))
///     .policies(Arc::new(taskflow::policy_table()?))
///     .store_timeout(Duration::from_millis(250))
///     .build()?;
///
/// let overview: Overview = cache
///     .fetch("analytics", "overview", user_id, None, || async { compute_overview(&db, user_id).await })
///     .await?;
///
/// // After a mutation:
/// cache.invalidate_namespace("analytics", user_id).await?;
/// ```
///
/// The cache never fails a read because of itself. Store errors, timeouts, corrupt payloads and failed writes are
/// handed to the [`Observer`] and the value is served by the loader. Only loader failures and API misuse are returned
/// to the caller.
#[fxstruct(sync, no_new, default(off), builder)]
pub struct ResourceCache {
    #[fieldx(get(clone))]
    store: Arc<dyn KeyValueStore>,

    #[fieldx(get(clone))]
    policies: Arc<PolicyTable>,

    #[fieldx(get(clone), default(TracingObserver::shared()))]
    observer: Arc<dyn Observer>,

    /// Limit for every single store call. A timed out call counts as the store being unavailable.
    #[fieldx(optional, get(copy))]
    store_timeout: Duration,

    /// Limit for a loader call. A timed out loader is [`CacheError::SourceUnavailable`].
    #[fieldx(optional, get(copy))]
    loader_timeout: Duration,
}

impl ResourceCache {
    /// Build a key for a registered resource.
    pub fn key(&self, namespace: &str, resource: &str, owner_id: OwnerId, variant: Option<&str>) -> Result<CacheKey> {
        self.policies().key(namespace, resource, owner_id, variant)
    }

    /// Read-through fetch of a resource.
    ///
    /// Serves the cached value if there is one. Otherwise calls the loader, stores its result with the resource's TTL
    /// and returns it, whether the store accepted it or not.
    pub async fn fetch<V, F, Fut, E>(
        &self,
        namespace: &str,
        resource: &str,
        owner_id: OwnerId,
        variant: Option<&str>,
        loader: F,
    ) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<BoxError>,
    {
        Ok(self
            .fetch_with_source(namespace, resource, owner_id, variant, loader)
            .await?
            .into_value())
    }

    /// Same as [`fetch`](Self::fetch) but also tells where the value came from.
    pub async fn fetch_with_source<V, F, Fut, E>(
        &self,
        namespace: &str,
        resource: &str,
        owner_id: OwnerId,
        variant: Option<&str>,
        loader: F,
    ) -> Result<Fetched<V>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<BoxError>,
    {
        let key = self.key(namespace, resource, owner_id, variant)?;
        self.fetch_key(&key, loader).await
    }

    #[instrument(level = "trace", skip_all, fields(key = %key))]
    pub async fn fetch_key<V, F, Fut, E>(&self, key: &CacheKey, loader: F) -> Result<Fetched<V>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<BoxError>,
    {
        let ttl = self.policies().ttl_of(key)?;
        let store = self.store();
        let observer = self.observer();
        let serialized = key.to_string();
        let mut origin = CacheSource::Loaded;

        match self.with_store_timeout(store.get(&serialized)).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<V>(&bytes) {
                Ok(value) => {
                    observer.on_hit(key).await;
                    return Ok(Fetched {
                        value,
                        source: CacheSource::Hit,
                    });
                }
                Err(source) => {
                    origin = CacheSource::Degraded;
                    observer
                        .on_degraded(&CacheError::CorruptEntry {
                            key: key.clone(),
                            source,
                        })
                        .await;
                }
            },
            Ok(None) => observer.on_miss(key).await,
            Err(source) => {
                origin = CacheSource::Degraded;
                observer
                    .on_degraded(&CacheError::CacheUnavailable {
                        key: key.clone(),
                        op: StoreOp::Get,
                        source,
                    })
                    .await;
            }
        }

        let value = self.load(key, loader).await?;

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(source) = self.with_store_timeout(store.set_with_ttl(&serialized, bytes, ttl)).await {
                    origin = CacheSource::Degraded;
                    observer
                        .on_degraded(&CacheError::CacheUnavailable {
                            key: key.clone(),
                            op: StoreOp::Set,
                            source,
                        })
                        .await;
                }
            }
            Err(source) => {
                origin = CacheSource::Degraded;
                observer
                    .on_degraded(&CacheError::Encoding {
                        key: key.clone(),
                        source,
                    })
                    .await;
            }
        }

        Ok(Fetched { value, source: origin })
    }

    /// Drop a single entry.
    pub async fn invalidate(
        &self,
        namespace: &str,
        resource: &str,
        owner_id: OwnerId,
        variant: Option<&str>,
    ) -> Result<InvalidationReport> {
        let key = self.key(namespace, resource, owner_id, variant)?;
        self.invalidate_keys(&[key]).await
    }

    /// Drop every variant of a resource.
    pub async fn invalidate_all(&self, namespace: &str, resource: &str, owner_id: OwnerId) -> Result<InvalidationReport> {
        let keys = self.policies().keys_for(namespace, resource, owner_id)?;
        self.invalidate_keys(&keys).await
    }

    /// Drop every entry of the owner in the namespace.
    pub async fn invalidate_namespace(&self, namespace: &str, owner_id: OwnerId) -> Result<InvalidationReport> {
        let keys = self.policies().namespace_keys(namespace, owner_id)?;
        self.invalidate_keys(&keys).await
    }

    /// Delete the keys one by one; a failed delete doesn't stop the others.
    ///
    /// When no key could be deleted the result is [`CacheError::InvalidationFailed`]. A partial failure is a success
    /// with the failed keys listed in the report. In both cases the observer is notified.
    #[instrument(level = "trace", skip_all, fields(count = keys.len()))]
    pub async fn invalidate_keys(&self, keys: &[CacheKey]) -> Result<InvalidationReport> {
        let store = self.store();
        let mut report = InvalidationReport::default();

        for key in keys {
            match self.with_store_timeout(store.delete(&key.to_string())).await {
                Ok(()) => report.deleted.push(key.clone()),
                Err(error) => {
                    tracing::debug!(%key, %error, "delete failed");
                    report.failed.push(key.clone());
                }
            }
        }

        if report.is_complete() {
            return Ok(report);
        }

        let error = CacheError::InvalidationFailed {
            keys: report.failed.clone(),
        };
        self.observer().on_invalidation_failed(&error).await;

        if report.deleted.is_empty() {
            Err(error)
        }
        else {
            Ok(report)
        }
    }

    /// Existence and payload size of resource entries. With an empty `variants` every variant of the resource is
    /// reported.
    pub async fn status(
        &self,
        namespace: &str,
        resource: &str,
        owner_id: OwnerId,
        variants: &[&str],
    ) -> Result<Vec<StatusEntry>> {
        let keys = if variants.is_empty() {
            self.policies().keys_for(namespace, resource, owner_id)?
        }
        else {
            variants
                .iter()
                .map(|variant| self.key(namespace, resource, owner_id, Some(variant)))
                .collect::<Result<Vec<_>>>()?
        };
        self.status_of(&keys).await
    }

    /// Status of every entry the owner may have in the namespace.
    pub async fn namespace_status(&self, namespace: &str, owner_id: OwnerId) -> Result<Vec<StatusEntry>> {
        let keys = self.policies().namespace_keys(namespace, owner_id)?;
        self.status_of(&keys).await
    }

    /// Never deserializes or touches the entries. Fails with [`CacheError::SourceUnavailable`] only if the store can't
    /// be reached.
    #[instrument(level = "trace", skip_all, fields(count = keys.len()))]
    pub async fn status_of(&self, keys: &[CacheKey]) -> Result<Vec<StatusEntry>> {
        let store = self.store();
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys {
            let size = self
                .with_store_timeout(store.size_of(&key.to_string()))
                .await
                .map_err(|err| CacheError::source_unavailable(key, err))?;
            entries.push(StatusEntry {
                key:        key.clone(),
                exists:     size.is_some(),
                size_bytes: size.unwrap_or(0),
            });
        }

        Ok(entries)
    }

    async fn load<V, F, Fut, E>(&self, key: &CacheKey, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<BoxError>,
    {
        let loading = loader();
        let loaded = match self.loader_timeout() {
            Some(after) => tokio::time::timeout(after, loading)
                .await
                .map_err(|elapsed| CacheError::source_unavailable(key, elapsed))?,
            None => loading.await,
        };
        loaded.map_err(|err| CacheError::source_unavailable(key, err))
    }

    async fn with_store_timeout<T, Fut>(&self, op: Fut) -> std::result::Result<T, StoreError>
    where
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        match self.store_timeout() {
            Some(after) => tokio::time::timeout(after, op).await.map_err(|_| StoreError::Timeout {
                store: self.store().name(),
                after,
            })?,
            None => op.await,
        }
    }
}

impl Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("store", &self.store().name())
            .field("policies", &self.policies())
            .field("store_timeout", &self.store_timeout())
            .field("loader_timeout", &self.loader_timeout())
            .finish_non_exhaustive()
    }
}
