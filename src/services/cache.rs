use crate::services::BoxFuture;
use redis::aio::ConnectionManager;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Byte-oriented key-value store behind the result cache
///
/// `put` replaces any existing value for the key in one step; a missing
/// key is `Ok(None)`, never an error.
pub trait CacheBackend: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, CacheError>>;

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Short label for health output
    fn name(&self) -> &'static str;
}

/// Process-local cache
///
/// Used on its own when no shared store is configured, and in tests.
pub struct MemoryCache {
    entries: moka::future::Cache<String, Vec<u8>>,
}

impl MemoryCache {
    pub fn new(capacity: u64, ttl: Option<Duration>) -> Self {
        let mut builder = moka::future::CacheBuilder::new(capacity);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            entries: builder.build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000, None)
    }
}

impl CacheBackend for MemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, CacheError>> {
        Box::pin(async move { Ok(self.entries.get(key).await) })
    }

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            self.entries.insert(key.to_string(), value).await;
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Multi-tier cache manager
///
/// Implements L1 (in-memory) and L2 (Redis) caching strategy.
/// L1 is fastest but limited in size, L2 is shared across instances.
pub struct CacheManager {
    redis: ConnectionManager,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    ttl_secs: u64,
}

impl CacheManager {
    /// Create a new cache manager
    pub async fn new(redis_url: &str, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Ok(Self {
            redis,
            l1_cache,
            ttl_secs,
        })
    }

    /// Get a value from cache (L1 first, then L2)
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(Some(bytes));
        }

        let mut conn = self.redis.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;

        match value {
            Some(bytes) => {
                tracing::trace!("L2 cache hit: {}", key);
                self.l1_cache.insert(key.to_string(), bytes.clone()).await;
                Ok(Some(bytes))
            }
            None => {
                tracing::trace!("Cache miss: {}", key);
                Ok(None)
            }
        }
    }

    /// Set a value in cache (both L1 and L2)
    pub async fn put_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        // SETEX replaces the whole value, so concurrent writers resolve last-write-wins
        let mut conn = self.redis.clone();
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(self.ttl_secs)
            .arg(value.as_slice())
            .query_async(&mut conn)
            .await?;

        self.l1_cache.insert(key.to_string(), value).await;

        tracing::trace!("Cache set: {}", key);
        Ok(())
    }
}

impl CacheBackend for CacheManager {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, CacheError>> {
        Box::pin(self.get_bytes(key))
    }

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(self.put_bytes(key, value))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
