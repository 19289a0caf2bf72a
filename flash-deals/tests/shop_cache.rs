use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use common_cache::{
    CacheConfig, CacheSource, LogicalExpireCache, LogicalExpireConfig, RebuildDispatcher,
    ReadThroughCache,
};
use common_redis::{Client, CustomRedisError, MemoryRedisClient};
use flash_deals::config::{CACHE_HOT_SHOP_KEY, DEFAULT_TEST_CONFIG, LOCK_SHOP_KEY};
use flash_deals::errors::StoreError;
use flash_deals::shops::ShopService;
use flash_deals::store::{MemoryStore, Shop, ShopStore};
use flash_deals::test_utils::test_shop;

/// Counts every trip to the backing store
#[derive(Clone, Default)]
struct CountingStore {
    inner: MemoryStore,
    loads: Arc<AtomicUsize>,
}

impl CountingStore {
    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShopStore for CountingStore {
    async fn get_shop(&self, id: i64) -> Result<Option<Shop>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_shop(id).await
    }

    async fn update_shop(&self, shop: &Shop) -> Result<bool, StoreError> {
        self.inner.update_shop(shop).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_absent_shop_loads_once_until_sentinel_expires() {
    let redis = Arc::new(MemoryRedisClient::new());
    let cache = ReadThroughCache::new(redis.clone(), CacheConfig::with_ttl("shop:", 1800), None);
    let loads = AtomicUsize::new(0);
    let counter = &loads;
    let loader = move |_: &i64| async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<Option<Shop>, StoreError>(None)
    };

    let first = cache.get_or_load(&42, loader).await.unwrap();
    let second = cache.get_or_load(&42, loader).await.unwrap();

    assert_eq!(first.source, CacheSource::LoaderNotFoundCacheMiss);
    assert_eq!(second.source, CacheSource::SentinelCache);
    assert!(second.value.is_none());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(redis.ttl("shop:42"), Some(Duration::from_secs(120)));

    tokio::time::advance(Duration::from_secs(121)).await;

    let third = cache.get_or_load(&42, loader).await.unwrap();
    let fourth = cache.get_or_load(&42, loader).await.unwrap();
    assert_eq!(third.source, CacheSource::LoaderNotFoundCacheMiss);
    assert_eq!(fourth.source, CacheSource::SentinelCache);
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_found_shop_round_trips_through_cache() {
    let store = CountingStore::default();
    let shop = test_shop(8);
    store.inner.insert_shop(shop.clone()).await;
    let redis = Arc::new(MemoryRedisClient::new());
    let service = ShopService::from_config(Arc::new(store.clone()), redis.clone(), &DEFAULT_TEST_CONFIG);

    let loaded = service.query_by_id(8).await.unwrap();
    let cached = service.query_by_id(8).await.unwrap();

    assert_eq!(loaded, shop);
    assert_eq!(cached, shop);
    assert_eq!(store.loads(), 1);

    let raw = redis.get("cache:shop:8".to_string()).await.unwrap();
    assert_eq!(raw, serde_json::to_string(&shop).unwrap());
}

#[tokio::test]
async fn test_concurrent_misses_with_mutex_load_once() {
    let store = CountingStore::default();
    store.inner.insert_shop(test_shop(3)).await;
    let redis = Arc::new(MemoryRedisClient::new());
    let service = ShopService::from_config(Arc::new(store.clone()), redis, &DEFAULT_TEST_CONFIG);

    let results = join_all((0..20).map(|_| service.query_by_id_with_mutex(3))).await;

    assert!(results.iter().all(|r| r.as_ref().unwrap().id == 3));
    assert_eq!(store.loads(), 1);
}

#[tokio::test]
async fn test_expired_hot_shop_served_stale_and_rebuilt_once() {
    let store = CountingStore::default();
    store.inner.insert_shop(test_shop(5)).await;
    let redis = Arc::new(MemoryRedisClient::new());

    // a zero lifetime makes every envelope expired as soon as it is written
    let hot_cache = LogicalExpireCache::new(
        redis.clone(),
        LogicalExpireConfig::new(CACHE_HOT_SHOP_KEY, LOCK_SHOP_KEY, Duration::ZERO),
        RebuildDispatcher::new(2),
    );
    let cache = ReadThroughCache::new(redis.clone(), DEFAULT_TEST_CONFIG.shop_cache_config(), None);
    let service = ShopService::new(Arc::new(store.clone()), cache, hot_cache);

    service.warm(5).await.unwrap();
    assert_eq!(store.loads(), 1);

    let mut renamed = test_shop(5);
    renamed.name = "Renamed".to_string();
    store.inner.update_shop(&renamed).await.unwrap();

    let results = join_all((0..16).map(|_| service.query_hot_by_id(5))).await;
    assert!(results
        .iter()
        .all(|r| r.as_ref().unwrap().name == "Shop 5"));

    // wait for the single rebuild to finish and drop its lock
    for _ in 0..100 {
        let lock_free = matches!(
            redis.get("lock:shop:5".to_string()).await,
            Err(CustomRedisError::NotFound)
        );
        if store.loads() == 2 && lock_free {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.loads(), 2);

    let raw = redis.get("cache:shop:hot:5".to_string()).await.unwrap();
    let envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(envelope["data"]["name"], "Renamed");
    assert!(envelope.get("logicalExpireAt").is_some());
}
