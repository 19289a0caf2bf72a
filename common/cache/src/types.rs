//! Cache configuration types and cache operation results
//!
//! - [`CacheConfig`]: configuration for a pass-through cache instance
//! - [`LogicalExpireConfig`]: configuration for a logical-expiry cache instance
//! - [`CacheSource`]: where a result came from (for observability)
//! - [`CacheResult`]: a value and its source
//! - [`CacheError`]: failures surfaced to callers

use common_redis::CustomRedisError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Value written under a cache key to record that the source of truth has no such record.
pub const NULL_SENTINEL: &str = "";

pub const DEFAULT_NULL_TTL_SECONDS: u64 = 120;
pub const DEFAULT_LOCK_TTL_SECONDS: u64 = 10;
pub const DEFAULT_MUTEX_ATTEMPTS: u32 = 20;
pub const DEFAULT_MUTEX_BACKOFF: Duration = Duration::from_millis(50);

/// Configuration for a [`crate::ReadThroughCache`]
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Key prefix for cached values (e.g. "cache:shop:")
    pub cache_prefix: String,

    /// TTL in seconds for found values. `None` caches indefinitely.
    pub ttl_seconds: Option<u64>,

    /// TTL in seconds for the "confirmed absent" sentinel
    pub null_ttl_seconds: u64,

    /// Key prefix for the rebuild lock used by `get_or_load_with_mutex`
    pub lock_prefix: String,

    pub lock_ttl_seconds: u64,

    /// How many times `get_or_load_with_mutex` tries to take the lock before
    /// falling back to an uncached load
    pub mutex_attempts: u32,

    pub mutex_backoff: Duration,
}

impl CacheConfig {
    pub fn new(cache_prefix: impl Into<String>, ttl_seconds: Option<u64>) -> Self {
        Self {
            cache_prefix: cache_prefix.into(),
            ttl_seconds,
            null_ttl_seconds: DEFAULT_NULL_TTL_SECONDS,
            lock_prefix: "lock:".to_string(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
            mutex_attempts: DEFAULT_MUTEX_ATTEMPTS,
            mutex_backoff: DEFAULT_MUTEX_BACKOFF,
        }
    }

    /// Cache found values with no TTL
    pub fn permanent(cache_prefix: impl Into<String>) -> Self {
        Self::new(cache_prefix, None)
    }

    pub fn with_ttl(cache_prefix: impl Into<String>, ttl_seconds: u64) -> Self {
        Self::new(cache_prefix, Some(ttl_seconds))
    }

    pub fn null_ttl(mut self, seconds: u64) -> Self {
        self.null_ttl_seconds = seconds;
        self
    }

    pub fn lock(mut self, lock_prefix: impl Into<String>, ttl_seconds: u64) -> Self {
        self.lock_prefix = lock_prefix.into();
        self.lock_ttl_seconds = ttl_seconds;
        self
    }

    pub fn mutex_policy(mut self, attempts: u32, backoff: Duration) -> Self {
        self.mutex_attempts = attempts;
        self.mutex_backoff = backoff;
        self
    }
}

/// Configuration for a [`crate::LogicalExpireCache`]
#[derive(Debug, Clone)]
pub struct LogicalExpireConfig {
    /// Key prefix for envelopes (e.g. "cache:shop:hot:")
    pub cache_prefix: String,

    /// Key prefix for the per-key rebuild lock (e.g. "lock:shop:")
    pub lock_prefix: String,

    pub lock_ttl_seconds: u64,

    /// Logical lifetime given to an envelope on every rebuild
    pub rebuild_ttl: Duration,
}

impl LogicalExpireConfig {
    pub fn new(
        cache_prefix: impl Into<String>,
        lock_prefix: impl Into<String>,
        rebuild_ttl: Duration,
    ) -> Self {
        Self {
            cache_prefix: cache_prefix.into(),
            lock_prefix: lock_prefix.into(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
            rebuild_ttl,
        }
    }

    pub fn lock_ttl(mut self, seconds: u64) -> Self {
        self.lock_ttl_seconds = seconds;
        self
    }
}

/// Indicates where a cached value came from and what operations were performed
///
/// `Display` renders snake_case for logs and metric labels:
/// ```
/// # use common_cache::CacheSource;
/// assert_eq!(CacheSource::SentinelCache.to_string(), "sentinel_cache");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    // Value found cases
    /// Value was found in the shared cache
    PositiveCache,
    /// Cache miss - value loaded from loader function
    LoaderCacheMiss,
    /// Cache data was corrupted - value loaded from loader function
    LoaderCacheCorrupted,
    /// Rebuild lock stayed busy - value loaded without touching the cache
    LoaderLockContended,

    // Value not found cases
    /// Key found in the in-process negative cache
    NegativeCache,
    /// The shared cache held the "confirmed absent" sentinel
    SentinelCache,
    /// Cache miss - loader indicated value doesn't exist, sentinel written
    LoaderNotFoundCacheMiss,
    /// Cache was corrupted - loader indicated value doesn't exist, sentinel written
    LoaderNotFoundCacheCorrupted,

    // Logical expiry
    /// Envelope still within its logical lifetime
    LogicalFresh,
    /// Envelope expired; this call scheduled the rebuild
    LogicalStale,
    /// Envelope expired; a rebuild was already in flight
    LogicalStaleRebuildPending,
    /// No envelope for this key. Logical expiry never loads on a miss.
    LogicalMiss,
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheSource::PositiveCache => "positive_cache",
            CacheSource::LoaderCacheMiss => "loader_cache_miss",
            CacheSource::LoaderCacheCorrupted => "loader_cache_corrupted",
            CacheSource::LoaderLockContended => "loader_lock_contended",
            CacheSource::NegativeCache => "negative_cache",
            CacheSource::SentinelCache => "sentinel_cache",
            CacheSource::LoaderNotFoundCacheMiss => "loader_not_found_cache_miss",
            CacheSource::LoaderNotFoundCacheCorrupted => "loader_not_found_cache_corrupted",
            CacheSource::LogicalFresh => "logical_fresh",
            CacheSource::LogicalStale => "logical_stale",
            CacheSource::LogicalStaleRebuildPending => "logical_stale_rebuild_pending",
            CacheSource::LogicalMiss => "logical_miss",
        };
        f.write_str(name)
    }
}

/// Result of a cache operation with detailed source information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResult<V> {
    /// The value, if found. None indicates the item doesn't exist (negative result)
    pub value: Option<V>,

    /// Where the result came from
    pub source: CacheSource,
}

impl<V> CacheResult<V> {
    pub fn found(value: V, source: CacheSource) -> Self {
        Self {
            value: Some(value),
            source,
        }
    }

    pub fn not_found(source: CacheSource) -> Self {
        Self {
            value: None,
            source,
        }
    }

    /// Answered from a cache layer without calling the loader
    pub fn was_cached(&self) -> bool {
        matches!(
            self.source,
            CacheSource::PositiveCache
                | CacheSource::NegativeCache
                | CacheSource::SentinelCache
                | CacheSource::LogicalFresh
                | CacheSource::LogicalStale
                | CacheSource::LogicalStaleRebuildPending
        )
    }

    /// The loader ran inline as part of this call
    pub fn invoked_loader(&self) -> bool {
        matches!(
            self.source,
            CacheSource::LoaderCacheMiss
                | CacheSource::LoaderCacheCorrupted
                | CacheSource::LoaderLockContended
                | CacheSource::LoaderNotFoundCacheMiss
                | CacheSource::LoaderNotFoundCacheCorrupted
        )
    }

    pub fn had_cache_problem(&self) -> bool {
        matches!(
            self.source,
            CacheSource::LoaderCacheCorrupted
                | CacheSource::LoaderNotFoundCacheCorrupted
                | CacheSource::LoaderLockContended
        )
    }

    /// The value may lag the source of truth by more than the normal TTL
    pub fn is_stale(&self) -> bool {
        matches!(
            self.source,
            CacheSource::LogicalStale | CacheSource::LogicalStaleRebuildPending
        )
    }
}

/// Failures surfaced by the pass-through cache.
///
/// The loader's own error type is carried through untouched. Shared-store failures on the read
/// path are never swallowed: the caller cannot tell a miss from an outage otherwise.
#[derive(Error, Debug)]
pub enum CacheError<E> {
    #[error("loader failed: {0}")]
    Loader(E),
    #[error("cache store failed: {0}")]
    Store(#[from] CustomRedisError),
}

impl<E> CacheError<E> {
    pub fn reason(&self) -> &'static str {
        match self {
            CacheError::Loader(_) => "loader",
            CacheError::Store(CustomRedisError::Timeout) => "store_timeout",
            CacheError::Store(_) => "store",
        }
    }
}
