use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::error::StoreError;
use crate::traits::KeyValueStore;

/// Store backed by a Redis server, shared by all service instances.
///
/// Uses a multiplexed, auto-reconnecting [`ConnectionManager`]. Redis expiry has a granularity of one second, so
/// shorter TTLs are rounded up to it.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::debug!(url = %redact_url(url), "connected to redis");
        Ok(Self { connection })
    }

    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn size_of(&self, key: &str) -> Result<Option<usize>, StoreError> {
        let mut conn = self.connection.clone();
        // STRLEN can't tell an empty value from a missing key.
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        if !exists {
            return Ok(None);
        }
        let size: usize = redis::cmd("STRLEN").arg(key).query_async(&mut conn).await?;
        Ok(Some(size))
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    }
    else {
        secs.max(1)
    }
}

fn redact_url(url: &str) -> String {
    let authority = url.find("://").map_or(0, |pos| pos + 3);
    if let Some(at_pos) = url[authority..].find('@').map(|pos| authority + pos) {
        if let Some(colon_pos) = url[authority..at_pos].rfind(':').map(|pos| authority + pos) {
            return format!("{}***{}", &url[..=colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}
