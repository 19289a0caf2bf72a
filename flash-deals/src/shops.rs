use common_cache::{
    CacheResult, LogicalExpireCache, NegativeCache, RebuildDispatcher, ReadThroughCache,
};
use common_metrics::inc;
use common_redis::Client as RedisClient;
use std::sync::Arc;
use tracing::instrument;

use crate::config::Config;
use crate::errors::ShopError;
use crate::metrics_consts::SHOP_WARMED_COUNTER;
use crate::store::{Shop, ShopStore};

/// Shop lookups fronted by the shared cache.
///
/// Ordinary shops go through the pass-through cache under `cache:shop:<id>`. Shops listed as
/// hot are pre-warmed into `cache:shop:hot:<id>` and read with logical expiry, so they are
/// never missing from cache and never rebuilt by more than one caller at a time.
pub struct ShopService {
    store: Arc<dyn ShopStore>,
    cache: ReadThroughCache,
    hot_cache: LogicalExpireCache,
}

impl ShopService {
    pub fn new(
        store: Arc<dyn ShopStore>,
        cache: ReadThroughCache,
        hot_cache: LogicalExpireCache,
    ) -> Self {
        Self {
            store,
            cache,
            hot_cache,
        }
    }

    pub fn from_config(
        store: Arc<dyn ShopStore>,
        redis: Arc<dyn RedisClient + Send + Sync>,
        config: &Config,
    ) -> Self {
        let negative_cache = (config.negative_cache_max_entries > 0).then(|| {
            Arc::new(NegativeCache::new(
                config.negative_cache_max_entries,
                config.negative_cache_ttl_seconds,
            ))
        });
        let cache = ReadThroughCache::new(redis.clone(), config.shop_cache_config(), negative_cache);
        let hot_cache = LogicalExpireCache::new(
            redis,
            config.hot_shop_cache_config(),
            RebuildDispatcher::new(config.rebuild_workers),
        );
        Self::new(store, cache, hot_cache)
    }

    #[instrument(skip_all, fields(shop_id = id))]
    pub async fn query_by_id(&self, id: i64) -> Result<Shop, ShopError> {
        let result = self
            .cache
            .get_or_load(&id, |id| self.store.get_shop(*id))
            .await?;
        found(result)
    }

    /// Like [`Self::query_by_id`], but concurrent misses for one shop load it only once.
    #[instrument(skip_all, fields(shop_id = id))]
    pub async fn query_by_id_with_mutex(&self, id: i64) -> Result<Shop, ShopError> {
        let result = self
            .cache
            .get_or_load_with_mutex(&id, |id| self.store.get_shop(*id))
            .await?;
        found(result)
    }

    /// Read a pre-warmed hot shop. May return a stale copy while a rebuild runs; a shop that
    /// was never warmed is `NotFound`.
    #[instrument(skip_all, fields(shop_id = id))]
    pub async fn query_hot_by_id(&self, id: i64) -> Result<Shop, ShopError> {
        let store = self.store.clone();
        let result = self
            .hot_cache
            .get_with_logical_expire(id, move |id| async move { store.get_shop(id).await })
            .await?;
        found(result)
    }

    /// Load `id` from the store into the hot cache with a full logical lifetime.
    pub async fn warm(&self, id: i64) -> Result<(), ShopError> {
        let shop = self.store.get_shop(id).await?.ok_or(ShopError::NotFound)?;

        let config = self.hot_cache.config();
        let key = format!("{}{}", config.cache_prefix, id);
        self.hot_cache
            .set_with_logical_expire(&key, shop, config.rebuild_ttl)
            .await?;

        inc(SHOP_WARMED_COUNTER, &[], 1);
        tracing::info!(shop_id = id, "Warmed hot shop");
        Ok(())
    }

    /// Write the shop to the store, then drop its cached copy so the next read reloads it.
    #[instrument(skip_all, fields(shop_id = shop.id))]
    pub async fn update(&self, shop: &Shop) -> Result<(), ShopError> {
        if !self.store.update_shop(shop).await? {
            return Err(ShopError::NotFound);
        }
        self.cache.invalidate(&shop.id).await?;
        Ok(())
    }
}

fn found(result: CacheResult<Shop>) -> Result<Shop, ShopError> {
    result.value.ok_or(ShopError::NotFound)
}
