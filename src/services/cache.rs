use crate::core::repository::{ListingRepository, RepositoryError};
use crate::models::{ExchangeType, Listing, ListingId, OwnerId, OwnerStats};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// Multi-tier cache manager
///
/// Implements L1 (in-memory) and L2 (Redis) caching strategy.
/// L1 is fastest but limited in size, L2 is shared across instances and
/// optional: without a Redis URL only L1 is used.
pub struct CacheManager {
    redis: Option<Arc<tokio::sync::Mutex<ConnectionManager>>>,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    ttl_secs: u64,
}

impl CacheManager {
    /// Create a cache manager backed by Redis
    pub async fn new(redis_url: &str, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Some(Arc::new(tokio::sync::Mutex::new(redis))),
            ..Self::in_memory(l1_size, ttl_secs)
        })
    }

    /// Create a cache manager with only the in-process tier
    pub fn in_memory(l1_size: u64, ttl_secs: u64) -> Self {
        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            redis: None,
            l1_cache,
            ttl_secs,
        }
    }

    pub fn has_shared_tier(&self) -> bool {
        self.redis.is_some()
    }

    /// Get a value from cache (L1 first, then L2)
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        // Try L1 cache first
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let Some(redis) = &self.redis else {
            tracing::trace!("Cache miss: {}", key);
            return Err(CacheError::CacheMiss(key.to_string()));
        };

        // Try L2 cache (Redis)
        let mut conn = redis.lock().await;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        if let Some(json) = value {
            tracing::trace!("L2 cache hit: {}", key);

            // Populate L1 cache
            let bytes = json.as_bytes().to_vec();
            self.l1_cache.insert(key.to_string(), bytes).await;

            return Ok(serde_json::from_str(&json)?);
        }

        tracing::trace!("Cache miss: {}", key);
        Err(CacheError::CacheMiss(key.to_string()))
    }

    /// Set a value in cache (both tiers)
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;

        // Set in L1 cache (uses configured TTL)
        let bytes = json.as_bytes().to_vec();
        self.l1_cache.insert(key.to_string(), bytes).await;

        if let Some(redis) = &self.redis {
            // Set in L2 cache with explicit TTL
            let mut conn = redis.lock().await;
            redis::cmd("SETEX")
                .arg(key)
                .arg(self.ttl_secs)
                .arg(json)
                .query_async::<()>(&mut *conn)
                .await?;
        }

        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    /// Delete a value from both cache tiers
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.l1_cache.invalidate(key).await;
        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_size: self.l1_cache.entry_count(),
            shared_tier: self.redis.is_some(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_size: u64,
    pub shared_tier: bool,
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Build a cache key for a single listing
    pub fn listing(listing_id: ListingId) -> String {
        format!("listing:{}", listing_id)
    }

    /// Build a cache key for the active pool of the given exchange types
    pub fn candidates(types: &[ExchangeType]) -> String {
        let mut names: Vec<&str> = types.iter().map(ExchangeType::as_str).collect();
        names.sort_unstable();
        names.dedup();
        format!("candidates:{}", names.join(","))
    }

    /// Build a cache key for owner exchange statistics
    pub fn owner_stats(owner_id: OwnerId) -> String {
        format!("owner_stats:{}", owner_id)
    }
}

/// Listing repository decorator that serves reads from the cache
///
/// Cache failures never fail a read; they fall through to the wrapped
/// repository.
pub struct CachedListingRepository<R> {
    inner: R,
    cache: Arc<CacheManager>,
}

impl<R: ListingRepository> CachedListingRepository<R> {
    pub fn new(inner: R, cache: Arc<CacheManager>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Drop a listing from the cache after the owner edited it
    pub async fn invalidate_listing(&self, listing_id: ListingId) {
        if let Err(e) = self.cache.delete(&CacheKey::listing(listing_id)).await {
            tracing::warn!("Failed to invalidate listing {}: {}", listing_id, e);
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.cache.set(key, value).await {
            tracing::warn!("Failed to cache {}: {}", key, e);
        }
    }
}

impl<R: ListingRepository> ListingRepository for CachedListingRepository<R> {
    async fn get_listing(&self, id: ListingId) -> Result<Listing, RepositoryError> {
        let key = CacheKey::listing(id);
        if let Ok(listing) = self.cache.get::<Listing>(&key).await {
            return Ok(listing);
        }

        let listing = self.inner.get_listing(id).await?;
        self.store(&key, &listing).await;
        Ok(listing)
    }

    async fn active_listings(
        &self,
        types: &[ExchangeType],
    ) -> Result<Vec<Listing>, RepositoryError> {
        let key = CacheKey::candidates(types);
        if let Ok(listings) = self.cache.get::<Vec<Listing>>(&key).await {
            return Ok(listings);
        }

        let listings = self.inner.active_listings(types).await?;
        self.store(&key, &listings).await;
        Ok(listings)
    }

    async fn owner_stats(&self, owner_id: OwnerId) -> Result<Option<OwnerStats>, RepositoryError> {
        let key = CacheKey::owner_stats(owner_id);
        if let Ok(stats) = self.cache.get::<Option<OwnerStats>>(&key).await {
            return Ok(stats);
        }

        let stats = self.inner.owner_stats(owner_id).await?;
        self.store(&key, &stats).await;
        Ok(stats)
    }
}
