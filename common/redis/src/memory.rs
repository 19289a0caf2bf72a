use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

use crate::{Client, CustomRedisError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

/// In-process [`Client`] with real key-value semantics.
///
/// Unlike [`crate::MockRedisClient`] this keeps state, honours TTLs and makes `SET NX` and
/// `INCR` atomic, so it can stand in for a single Redis node in concurrency tests. Expiry uses
/// `tokio::time`, which lets tests drive it with a paused clock.
#[derive(Clone, Default)]
pub struct MemoryRedisClient {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock_entries()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live, `None` for a missing key or one without expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.lock_entries();
        let entry = entries.get(key).filter(|e| !e.is_expired(now))?;
        entry.expires_at.map(|t| t.saturating_duration_since(now))
    }

    fn put(&self, key: String, value: String, ttl: Option<u64>) {
        let expires_at = ttl.map(|secs| Instant::now() + Duration::from_secs(secs));
        self.lock_entries()
            .insert(key, Entry { value, expires_at });
    }
}

#[async_trait]
impl Client for MemoryRedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        match entries.get(&k) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(&k);
                Err(CustomRedisError::NotFound)
            }
            Some(entry) => Ok(entry.value.clone()),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        self.put(k, v, None);
        Ok(())
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        if seconds == 0 {
            return Err(CustomRedisError::InvalidConfiguration(
                "invalid expire time in 'setex' command".to_string(),
            ));
        }
        self.put(k, v, Some(seconds));
        Ok(())
    }

    async fn set_nx_ex(
        &self,
        k: String,
        v: String,
        seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        if seconds == 0 {
            return Err(CustomRedisError::InvalidConfiguration(
                "invalid expire time in 'set' command".to_string(),
            ));
        }
        let now = Instant::now();
        let mut entries = self.lock_entries();
        if entries.get(&k).is_some_and(|e| !e.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(
            k,
            Entry {
                value: v,
                expires_at: Some(now + Duration::from_secs(seconds)),
            },
        );
        Ok(true)
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        self.lock_entries().remove(&k);
        Ok(())
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        let now = Instant::now();
        let mut entries = self.lock_entries();

        let (current, expires_at) = match entries.get(&k) {
            Some(entry) if !entry.is_expired(now) => {
                let current = entry.value.parse::<i64>().map_err(|_| {
                    CustomRedisError::ParseError(
                        "value is not an integer or out of range".to_string(),
                    )
                })?;
                (current, entry.expires_at)
            }
            _ => (0, None),
        };

        let next = current.checked_add(1).ok_or_else(|| {
            CustomRedisError::ParseError("increment or decrement would overflow".to_string())
        })?;
        entries.insert(
            k,
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }
}
