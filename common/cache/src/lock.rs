use common_redis::{Client as RedisClient, CustomRedisError};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

const LOCK_VALUE: &str = "1";

/// Advisory, key-scoped lock held as a short-lived entry in the shared store.
///
/// Acquisition is a single `SET key 1 EX ttl NX`; the TTL bounds how long a crashed holder can
/// block everyone else. Not reentrant, not fair, no queueing.
#[derive(Clone)]
pub struct KeyedMutexLock {
    redis: Arc<dyn RedisClient + Send + Sync>,
    ttl_seconds: u64,
}

impl KeyedMutexLock {
    pub fn new(redis: Arc<dyn RedisClient + Send + Sync>, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    /// Returns true iff this call created the lock entry.
    pub async fn acquire(&self, key: &str) -> Result<bool, CustomRedisError> {
        self.redis
            .set_nx_ex(key.to_string(), LOCK_VALUE.to_string(), self.ttl_seconds)
            .await
    }

    /// Unconditional delete.
    pub async fn release(&self, key: &str) -> Result<(), CustomRedisError> {
        self.redis.del(key.to_string()).await
    }

    /// Try `attempts` times, sleeping `backoff` between tries.
    /// Returns false once the attempts are used up.
    pub async fn acquire_with_retry(
        &self,
        key: &str,
        attempts: u32,
        backoff: Duration,
    ) -> Result<bool, CustomRedisError> {
        for attempt in 0..attempts {
            if self.acquire(key).await? {
                return Ok(true);
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(backoff).await;
            }
        }
        Ok(false)
    }

    /// Drive `work` to completion and release `key` afterwards, even if `work` panics.
    ///
    /// The caller must already hold the lock. A panic is returned as `Err` with its payload
    /// rather than resumed, so the caller decides whether to propagate it.
    pub async fn run_then_release<F, T>(&self, key: &str, work: F) -> std::thread::Result<T>
    where
        F: Future<Output = T>,
    {
        let outcome = AssertUnwindSafe(work).catch_unwind().await;

        if let Err(e) = self.release(key).await {
            tracing::warn!(lock_key = key, error = %e, "Failed to release lock, waiting for TTL");
        }

        outcome
    }
}
