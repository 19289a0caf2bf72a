//! In-process record of keys the source of truth is known not to have
//!
//! Sits in front of the shared-store sentinel so repeated lookups for absent ids on one
//! instance never reach the network. Bounded in size and entries expire on their own.

use moka::sync::Cache;
use std::time::Duration;

#[derive(Clone)]
pub struct NegativeCache {
    cache: Cache<String, ()>,
}

impl NegativeCache {
    /// ```rust
    /// use common_cache::NegativeCache;
    ///
    /// let cache = NegativeCache::new(10_000, 60);
    /// cache.insert("cache:shop:42".to_string());
    /// assert!(cache.contains("cache:shop:42"));
    /// ```
    pub fn new(max_capacity: u64, ttl_seconds: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_seconds))
            .build();

        Self { cache }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    pub fn insert(&self, key: String) {
        self.cache.insert(key, ());
    }

    /// Forget `key`, e.g. once a value for it has been found or written.
    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    #[cfg(test)]
    fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_invalidate() {
        let negative_cache = NegativeCache::new(100, 300);

        assert!(!negative_cache.contains("cache:shop:42"));
        negative_cache.insert("cache:shop:42".to_string());
        assert!(negative_cache.contains("cache:shop:42"));

        negative_cache.invalidate("cache:shop:42");
        assert!(!negative_cache.contains("cache:shop:42"));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let negative_cache = NegativeCache::new(100, 1);
        negative_cache.insert("cache:shop:7".to_string());
        assert!(negative_cache.contains("cache:shop:7"));

        // moka keeps its own clock, so this needs real time
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!negative_cache.contains("cache:shop:7"));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let negative_cache = NegativeCache::new(2, 300);
        for id in 0..10 {
            negative_cache.insert(format!("cache:shop:{id}"));
        }
        assert!(negative_cache.entry_count() <= 2);
    }
}
