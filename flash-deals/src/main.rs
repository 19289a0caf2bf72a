use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use futures::stream::{self, StreamExt};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common_redis::RedisClient;
use flash_deals::config::Config;
use flash_deals::shops::ShopService;
use flash_deals::store::PgStore;

/// Pre-warms every shop in HOT_SHOP_IDS into the logical-expiry cache, then exits.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().expect("Invalid configuration:");

    let log_layer = {
        let base_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true);

        if *config.debug {
            base_layer
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_ansi(true)
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        } else {
            base_layer
                .json()
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        }
    };
    tracing_subscriber::registry().with(log_layer).init();

    if config.enable_metrics {
        common_metrics::install_prometheus_exporter(config.metrics_address)
            .context("failed to install prometheus exporter")?;
    }

    let redis = RedisClient::with_config(
        config.redis_url.clone(),
        config.redis_response_timeout(),
        config.redis_connection_timeout(),
    )
    .await
    .context("failed to connect to redis")?;

    let pool = common_database::get_pool(&config.database_url, config.max_pg_connections)
        .await
        .context("failed to connect to postgres")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let service = ShopService::from_config(Arc::new(PgStore::new(pool)), Arc::new(redis), &config);

    if config.hot_shop_ids.is_empty() {
        tracing::warn!("HOT_SHOP_IDS is empty, nothing to warm");
        return Ok(());
    }

    let failures: Vec<i64> = stream::iter(config.hot_shop_ids.iter().copied())
        .map(|id| {
            let service = &service;
            async move {
                match service.warm(id).await {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::error!(shop_id = id, error = %e, "Failed to warm shop");
                        Some(id)
                    }
                }
            }
        })
        .buffer_unordered(config.rebuild_workers.max(1))
        .filter_map(|failed| async move { failed })
        .collect()
        .await;

    tracing::info!(
        requested = config.hot_shop_ids.len(),
        failed = failures.len(),
        "Hot shop warm-up finished"
    );

    if !failures.is_empty() {
        anyhow::bail!("failed to warm shops {:?}", failures);
    }
    Ok(())
}
