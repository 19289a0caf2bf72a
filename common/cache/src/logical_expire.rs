//! Stale-while-rebuild cache for pre-warmed hot keys
//!
//! Entries are [`SnapshotEnvelope`]s written without a physical TTL. A reader that finds an
//! expired envelope still gets the stale payload immediately; the first reader to win the
//! per-key [`KeyedMutexLock`] schedules one rebuild on the [`RebuildDispatcher`]. If the
//! dispatcher has no free slot the lock is given back straight away, so a later reader can
//! schedule the rebuild once a slot frees up. A key with no
//! envelope at all is reported missing and never loaded here: hot keys are populated with
//! [`LogicalExpireCache::set_with_logical_expire`] ahead of time.

use crate::dispatcher::RebuildDispatcher;
use crate::lock::KeyedMutexLock;
use crate::metrics::{CacheMetrics, RebuildOutcome};
use crate::{CacheResult, CacheSource, LogicalExpireConfig, SnapshotEnvelope};
use chrono::Utc;
use common_redis::{Client as RedisClient, CustomRedisError};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct LogicalExpireCache {
    redis: Arc<dyn RedisClient + Send + Sync>,
    config: LogicalExpireConfig,
    lock: KeyedMutexLock,
    dispatcher: RebuildDispatcher,
    metrics: CacheMetrics,
}

impl LogicalExpireCache {
    pub fn new(
        redis: Arc<dyn RedisClient + Send + Sync>,
        config: LogicalExpireConfig,
        dispatcher: RebuildDispatcher,
    ) -> Self {
        let lock = KeyedMutexLock::new(redis.clone(), config.lock_ttl_seconds);
        let metrics = CacheMetrics::new(&config.cache_prefix);
        Self {
            redis,
            config,
            lock,
            dispatcher,
            metrics,
        }
    }

    pub fn config(&self) -> &LogicalExpireConfig {
        &self.config
    }

    /// Write `value` under `key` (a full store key) so it stays fresh for `ttl`.
    /// The store entry itself never expires.
    pub async fn set_with_logical_expire<V>(
        &self,
        key: &str,
        value: V,
        ttl: Duration,
    ) -> Result<(), CustomRedisError>
    where
        V: Serialize,
    {
        write_envelope(self.redis.as_ref(), key, value, ttl).await
    }

    /// Read `cache_prefix + key`.
    ///
    /// - no envelope: `LogicalMiss`, no load
    /// - fresh envelope: returned as is
    /// - expired envelope: returned as is; if this call takes `lock_prefix + key` a rebuild
    ///   calling `loader` is scheduled, otherwise one is already in flight
    pub async fn get_with_logical_expire<K, V, E, F, Fut>(
        &self,
        key: K,
        loader: F,
    ) -> Result<CacheResult<V>, CustomRedisError>
    where
        K: Display + Send + 'static,
        V: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<V>, E>> + Send + 'static,
    {
        let (result, _) = self.read_or_schedule(key, loader).await?;
        Ok(result)
    }

    /// [`Self::get_with_logical_expire`] that also hands back the rebuild task, if this call
    /// scheduled one. `LogicalStale` always comes with a handle; `LogicalStaleRebuildPending`
    /// never does.
    pub async fn read_or_schedule<K, V, E, F, Fut>(
        &self,
        key: K,
        loader: F,
    ) -> Result<(CacheResult<V>, Option<JoinHandle<RebuildOutcome>>), CustomRedisError>
    where
        K: Display + Send + 'static,
        V: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce(K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<V>, E>> + Send + 'static,
    {
        let cache_key = format!("{}{}", self.config.cache_prefix, key);

        let raw = match self.redis.get(cache_key.clone()).await {
            Ok(raw) => raw,
            Err(CustomRedisError::NotFound) => {
                self.metrics.read(CacheSource::LogicalMiss);
                return Ok((CacheResult::not_found(CacheSource::LogicalMiss), None));
            }
            Err(err) => {
                tracing::error!(cache_key = %cache_key, error = %err, "Cache store read failed");
                self.metrics.error("store_read");
                return Err(err);
            }
        };

        let envelope: SnapshotEnvelope<V> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(cache_key = %cache_key, error = %err, "Unreadable envelope, treating as missing");
                self.metrics.error("corrupted");
                self.metrics.read(CacheSource::LogicalMiss);
                return Ok((CacheResult::not_found(CacheSource::LogicalMiss), None));
            }
        };

        if envelope.is_fresh(Utc::now()) {
            self.metrics.read(CacheSource::LogicalFresh);
            return Ok((
                CacheResult::found(envelope.data, CacheSource::LogicalFresh),
                None,
            ));
        }

        let lock_key = format!("{}{}", self.config.lock_prefix, key);
        let acquired = match self.lock.acquire(&lock_key).await {
            Ok(acquired) => acquired,
            Err(err) => {
                // the stale value is still worth serving; the next reader retries the lock
                tracing::warn!(lock_key = %lock_key, error = %err, "Could not take rebuild lock");
                self.metrics.error("lock");
                false
            }
        };

        if !acquired {
            self.metrics.read(CacheSource::LogicalStaleRebuildPending);
            return Ok((
                CacheResult::found(envelope.data, CacheSource::LogicalStaleRebuildPending),
                None,
            ));
        }

        self.metrics.rebuild_slots(self.dispatcher.available_slots());
        let Some(slot) = self.dispatcher.try_reserve() else {
            tracing::warn!(cache_key = %cache_key, "Rebuild pool full, serving stale envelope");
            self.metrics.error("rebuild_pool_full");
            if let Err(err) = self.lock.release(&lock_key).await {
                tracing::warn!(lock_key = %lock_key, error = %err, "Failed to release rebuild lock");
                self.metrics.error("lock");
            }
            self.metrics.read(CacheSource::LogicalStaleRebuildPending);
            return Ok((
                CacheResult::found(envelope.data, CacheSource::LogicalStaleRebuildPending),
                None,
            ));
        };

        tracing::debug!(cache_key = %cache_key, "Envelope expired, scheduling rebuild");
        let handle = self.dispatcher.spawn(
            slot,
            self.clone().rebuild(key, cache_key, lock_key, loader),
        );

        self.metrics.read(CacheSource::LogicalStale);
        Ok((
            CacheResult::found(envelope.data, CacheSource::LogicalStale),
            Some(handle),
        ))
    }

    async fn rebuild<K, V, E, F, Fut>(
        self,
        key: K,
        cache_key: String,
        lock_key: String,
        loader: F,
    ) -> RebuildOutcome
    where
        V: Serialize,
        E: Display,
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let started = Instant::now();
        let redis = self.redis.clone();
        let ttl = self.config.rebuild_ttl;

        let work = async {
            match loader(key).await {
                Ok(Some(value)) => {
                    match write_envelope(redis.as_ref(), &cache_key, value, ttl).await {
                        Ok(()) => RebuildOutcome::Refreshed,
                        Err(err) => {
                            tracing::warn!(cache_key = %cache_key, error = %err, "Failed to write rebuilt envelope");
                            RebuildOutcome::Failed
                        }
                    }
                }
                Ok(None) => match redis.del(cache_key.clone()).await {
                    Ok(()) => RebuildOutcome::Removed,
                    Err(err) => {
                        tracing::warn!(cache_key = %cache_key, error = %err, "Failed to drop envelope for removed record");
                        RebuildOutcome::Failed
                    }
                },
                Err(err) => {
                    tracing::warn!(cache_key = %cache_key, error = %err, "Rebuild loader failed, keeping stale envelope");
                    RebuildOutcome::Failed
                }
            }
        };

        let outcome = match self.lock.run_then_release(&lock_key, work).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(cache_key = %cache_key, "Rebuild panicked, keeping stale envelope");
                RebuildOutcome::Panicked
            }
        };

        self.metrics.rebuild(outcome, started.elapsed());
        outcome
    }
}

async fn write_envelope<V>(
    redis: &(dyn RedisClient + Send + Sync),
    key: &str,
    value: V,
    ttl: Duration,
) -> Result<(), CustomRedisError>
where
    V: Serialize,
{
    let envelope = SnapshotEnvelope::new(value, Utc::now(), ttl);
    let serialized = serde_json::to_string(&envelope).map_err(|e| {
        CustomRedisError::ParseError(format!("Failed to serialize envelope: {e}"))
    })?;
    redis.set(key.to_string(), serialized).await
}
