//! Pass-through cache over the shared key-value store
//!
//! [`ReadThroughCache`] implements cache-aside with two defences:
//! - penetration: a confirmed-absent id is recorded as an empty-string sentinel with a short
//!   TTL (and optionally in a process-local [`NegativeCache`]) so repeated lookups stop
//!   reaching the loader
//! - breakdown: [`ReadThroughCache::get_or_load_with_mutex`] lets only the holder of a
//!   per-key [`KeyedMutexLock`] run the loader on a miss while others back off and re-read

use crate::lock::KeyedMutexLock;
use crate::metrics::CacheMetrics;
use crate::types::NULL_SENTINEL;
use crate::{CacheConfig, CacheError, CacheResult, CacheSource, NegativeCache};
use common_redis::{Client as RedisClient, CustomRedisError};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// What the shared store holds for a key
enum Lookup<V> {
    Hit(V),
    Sentinel,
    Miss,
    Corrupted,
}

/// Generic pass-through cache.
///
/// Values are stored as JSON under `cache_prefix + key`. Loader errors come back as
/// [`CacheError::Loader`]; shared-store read failures as [`CacheError::Store`]. A failed cache
/// write after a successful load is logged and counted, and the loaded value is still returned.
///
/// # Example
/// ```rust,ignore
/// use common_cache::{CacheConfig, CacheSource, ReadThroughCache};
///
/// let cache = ReadThroughCache::new(redis, CacheConfig::with_ttl("cache:shop:", 1800), None);
///
/// let result = cache
///     .get_or_load(&shop_id, |id| async move { store.get_shop(*id).await })
///     .await?;
///
/// match result.source {
///     CacheSource::PositiveCache => println!("Cache hit!"),
///     CacheSource::SentinelCache => println!("Known to be absent"),
///     _ => {}
/// }
/// ```
pub struct ReadThroughCache {
    redis: Arc<dyn RedisClient + Send + Sync>,
    config: CacheConfig,
    negative_cache: Option<Arc<NegativeCache>>,
    lock: KeyedMutexLock,
    metrics: CacheMetrics,
}

impl ReadThroughCache {
    pub fn new(
        redis: Arc<dyn RedisClient + Send + Sync>,
        config: CacheConfig,
        negative_cache: Option<Arc<NegativeCache>>,
    ) -> Self {
        let lock = KeyedMutexLock::new(redis.clone(), config.lock_ttl_seconds);
        let metrics = CacheMetrics::new(&config.cache_prefix);
        Self {
            redis,
            config,
            negative_cache,
            lock,
            metrics,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a value from cache or load it.
    ///
    /// 1. Negative cache (if enabled)
    /// 2. Shared store: a value is returned, the sentinel means "confirmed absent"
    /// 3. On a true miss or corrupted entry, call `loader` once. `Some` is cached with the
    ///    configured TTL; `None` writes the sentinel with the null TTL.
    pub async fn get_or_load<K, V, E, F, Fut>(
        &self,
        key: &K,
        loader: F,
    ) -> Result<CacheResult<V>, CacheError<E>>
    where
        K: Display + Send + Sync,
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let cache_key = self.build_cache_key(key);

        let result = match self.check_negative_cache(&cache_key) {
            Some(result) => result,
            None => match self.lookup(&cache_key).await? {
                Lookup::Hit(value) => CacheResult::found(value, CacheSource::PositiveCache),
                Lookup::Sentinel => self.sentinel_hit(&cache_key),
                Lookup::Miss => self.load_and_fill(key, &cache_key, loader, false).await?,
                Lookup::Corrupted => self.load_and_fill(key, &cache_key, loader, true).await?,
            },
        };

        tracing::debug!(cache_key = %cache_key, source = %result.source, "Cache read");
        self.metrics.observe(&result);
        Ok(result)
    }

    /// Like [`Self::get_or_load`], but on a miss only the holder of `lock_prefix + key` runs the
    /// loader.
    ///
    /// Callers that lose the race sleep `mutex_backoff` and re-read the cache, up to
    /// `mutex_attempts` times. The holder re-checks the cache before loading, since a previous
    /// holder may have just filled it. When every attempt is used up the loader is called once
    /// without touching the cache ([`CacheSource::LoaderLockContended`]).
    pub async fn get_or_load_with_mutex<K, V, E, F, Fut>(
        &self,
        key: &K,
        loader: F,
    ) -> Result<CacheResult<V>, CacheError<E>>
    where
        K: Display + Send + Sync,
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let cache_key = self.build_cache_key(key);
        if let Some(result) = self.check_negative_cache(&cache_key) {
            self.metrics.observe(&result);
            return Ok(result);
        }

        let lock_key = format!("{}{}", self.config.lock_prefix, key);

        for attempt in 0..self.config.mutex_attempts {
            match self.lookup::<V>(&cache_key).await? {
                Lookup::Hit(value) => {
                    let result = CacheResult::found(value, CacheSource::PositiveCache);
                    self.metrics.observe(&result);
                    return Ok(result);
                }
                Lookup::Sentinel => {
                    let result = self.sentinel_hit(&cache_key);
                    self.metrics.observe(&result);
                    return Ok(result);
                }
                Lookup::Miss | Lookup::Corrupted => {}
            }

            if self.lock.acquire(&lock_key).await? {
                let outcome = self
                    .lock
                    .run_then_release(&lock_key, self.fill_under_lock(key, &cache_key, loader))
                    .await;
                let result = match outcome {
                    Ok(result) => result?,
                    Err(panic) => std::panic::resume_unwind(panic),
                };
                self.metrics.observe(&result);
                return Ok(result);
            }

            tracing::debug!(lock_key = %lock_key, attempt, "Rebuild lock busy, backing off");
            tokio::time::sleep(self.config.mutex_backoff).await;
        }

        tracing::warn!(
            lock_key = %lock_key,
            attempts = self.config.mutex_attempts,
            "Rebuild lock still busy, loading without cache"
        );
        let value = loader(key).await.map_err(CacheError::Loader)?;
        let result = CacheResult {
            value,
            source: CacheSource::LoaderLockContended,
        };
        self.metrics.observe(&result);
        Ok(result)
    }

    /// Serialize and store `value` under `cache_prefix + key` with the configured TTL.
    pub async fn set<K, V>(&self, key: &K, value: &V) -> Result<(), CustomRedisError>
    where
        K: Display,
        V: Serialize,
    {
        let cache_key = self.build_cache_key(key);
        self.write_value(&cache_key, value).await
    }

    /// Drop the cached value (or sentinel) so the next read goes to the loader.
    pub async fn invalidate<K>(&self, key: &K) -> Result<(), CustomRedisError>
    where
        K: Display,
    {
        let cache_key = self.build_cache_key(key);
        if let Some(neg_cache) = &self.negative_cache {
            neg_cache.invalidate(&cache_key);
        }
        self.redis.del(cache_key).await
    }

    fn build_cache_key<K>(&self, key: &K) -> String
    where
        K: Display,
    {
        format!("{}{}", self.config.cache_prefix, key)
    }

    fn check_negative_cache<V>(&self, cache_key: &str) -> Option<CacheResult<V>> {
        let neg_cache = self.negative_cache.as_ref()?;
        neg_cache
            .contains(cache_key)
            .then(|| CacheResult::not_found(CacheSource::NegativeCache))
    }

    fn sentinel_hit<V>(&self, cache_key: &str) -> CacheResult<V> {
        if let Some(neg_cache) = &self.negative_cache {
            neg_cache.insert(cache_key.to_string());
        }
        CacheResult::not_found(CacheSource::SentinelCache)
    }

    async fn lookup<V>(&self, cache_key: &str) -> Result<Lookup<V>, CustomRedisError>
    where
        V: DeserializeOwned,
    {
        let raw = match self.redis.get(cache_key.to_string()).await {
            Ok(raw) => raw,
            Err(CustomRedisError::NotFound) => return Ok(Lookup::Miss),
            Err(CustomRedisError::ParseError(err)) => {
                tracing::warn!(cache_key, error = %err, "Unreadable cache entry, reloading");
                self.metrics.error("corrupted");
                return Ok(Lookup::Corrupted);
            }
            Err(err) => {
                tracing::error!(cache_key, error = %err, "Cache store read failed");
                self.metrics.error("store_read");
                return Err(err);
            }
        };

        if raw == NULL_SENTINEL {
            return Ok(Lookup::Sentinel);
        }

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Lookup::Hit(value)),
            Err(err) => {
                tracing::warn!(cache_key, error = %err, "Corrupted cache entry, reloading");
                self.metrics.error("corrupted");
                Ok(Lookup::Corrupted)
            }
        }
    }

    async fn fill_under_lock<K, V, E, F, Fut>(
        &self,
        key: &K,
        cache_key: &str,
        loader: F,
    ) -> Result<CacheResult<V>, CacheError<E>>
    where
        K: Display + Send + Sync,
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        match self.lookup(cache_key).await? {
            Lookup::Hit(value) => Ok(CacheResult::found(value, CacheSource::PositiveCache)),
            Lookup::Sentinel => Ok(self.sentinel_hit(cache_key)),
            Lookup::Miss => self.load_and_fill(key, cache_key, loader, false).await,
            Lookup::Corrupted => self.load_and_fill(key, cache_key, loader, true).await,
        }
    }

    async fn load_and_fill<K, V, E, F, Fut>(
        &self,
        key: &K,
        cache_key: &str,
        loader: F,
        corrupted: bool,
    ) -> Result<CacheResult<V>, CacheError<E>>
    where
        K: Display + Send + Sync,
        V: Serialize + Send + Sync,
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        match loader(key).await.map_err(CacheError::Loader)? {
            Some(value) => {
                if let Some(neg_cache) = &self.negative_cache {
                    neg_cache.invalidate(cache_key);
                }

                if let Err(err) = self.write_value(cache_key, &value).await {
                    tracing::warn!(cache_key, error = %err, "Failed to fill cache");
                    self.metrics.error("store_write");
                }

                let source = if corrupted {
                    CacheSource::LoaderCacheCorrupted
                } else {
                    CacheSource::LoaderCacheMiss
                };
                Ok(CacheResult::found(value, source))
            }
            None => {
                if let Some(neg_cache) = &self.negative_cache {
                    neg_cache.insert(cache_key.to_string());
                }

                if let Err(err) = self
                    .redis
                    .setex(
                        cache_key.to_string(),
                        NULL_SENTINEL.to_string(),
                        self.config.null_ttl_seconds,
                    )
                    .await
                {
                    tracing::warn!(cache_key, error = %err, "Failed to write absent sentinel");
                    self.metrics.error("store_write");
                }

                let source = if corrupted {
                    CacheSource::LoaderNotFoundCacheCorrupted
                } else {
                    CacheSource::LoaderNotFoundCacheMiss
                };
                Ok(CacheResult::not_found(source))
            }
        }
    }

    async fn write_value<V>(&self, cache_key: &str, value: &V) -> Result<(), CustomRedisError>
    where
        V: Serialize,
    {
        let serialized_value = serde_json::to_string(value).map_err(|e| {
            CustomRedisError::ParseError(format!("Failed to serialize value for cache: {e}"))
        })?;

        match self.config.ttl_seconds {
            Some(ttl) => {
                self.redis
                    .setex(cache_key.to_string(), serialized_value, ttl)
                    .await
            }
            None => self.redis.set(cache_key.to_string(), serialized_value).await,
        }
    }
}
