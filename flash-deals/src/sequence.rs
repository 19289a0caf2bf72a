use chrono::{DateTime, Utc};
use common_metrics::inc;
use common_redis::{Client as RedisClient, CustomRedisError};
use std::sync::Arc;

use crate::metrics_consts::SEQUENCE_IDS_ISSUED_COUNTER;

/// 2022-01-01T00:00:00Z
pub const BEGIN_TIMESTAMP: i64 = 1_640_995_200;
pub const COUNT_BITS: u32 = 32;
pub const ORDER_ID_PREFIX: &str = "order";

/// Issues 64-bit ids as `(seconds since BEGIN_TIMESTAMP) << 32 | per-day counter`.
///
/// The counter lives in the shared store under `seq:<prefix>:<YYYY:MM:DD>` and is bumped with
/// a single INCR, so any number of instances can issue ids for the same prefix. Ids for one
/// prefix never repeat while a day stays below 2^32 issues.
#[derive(Clone)]
pub struct SequenceGenerator {
    redis: Arc<dyn RedisClient + Send + Sync>,
}

impl SequenceGenerator {
    pub fn new(redis: Arc<dyn RedisClient + Send + Sync>) -> Self {
        Self { redis }
    }

    pub async fn next_id(&self, prefix: &str) -> Result<i64, CustomRedisError> {
        self.next_id_at(prefix, Utc::now()).await
    }

    pub async fn next_id_at(
        &self,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, CustomRedisError> {
        let timestamp = now.timestamp() - BEGIN_TIMESTAMP;
        let key = counter_key(prefix, now);
        let count = self.redis.incr(key).await?;

        inc(
            SEQUENCE_IDS_ISSUED_COUNTER,
            &[("prefix".to_string(), prefix.to_string())],
            1,
        );

        Ok((timestamp << COUNT_BITS) | count)
    }
}

fn counter_key(prefix: &str, now: DateTime<Utc>) -> String {
    format!("seq:{}:{}", prefix, now.format("%Y:%m:%d"))
}

/// Splits an id back into (seconds since BEGIN_TIMESTAMP, counter).
pub fn decompose(id: i64) -> (i64, i64) {
    (id >> COUNT_BITS, id & ((1i64 << COUNT_BITS) - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common_redis::{MemoryRedisClient, MockRedisClient};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_counter_key_is_scoped_by_day() {
        assert_eq!(
            counter_key("order", at(2024, 3, 7, 23, 59, 59)),
            "seq:order:2024:03:07"
        );
    }

    #[tokio::test]
    async fn test_id_layout() {
        let redis = MockRedisClient::new().incr_ret("seq:order:2022:01:01", Ok(5));
        let generator = SequenceGenerator::new(Arc::new(redis.clone()));

        let id = generator
            .next_id_at("order", at(2022, 1, 1, 0, 0, 10))
            .await
            .unwrap();

        assert_eq!(id, (10 << 32) | 5);
        assert_eq!(decompose(id), (10, 5));
        assert_eq!(redis.calls_for("incr")[0].key, "seq:order:2022:01:01");
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let redis = MockRedisClient::new().incr_ret("seq:order:2024:01:01", Err(CustomRedisError::Timeout));
        let generator = SequenceGenerator::new(Arc::new(redis));

        let result = generator.next_id_at("order", at(2024, 1, 1, 12, 0, 0)).await;
        assert!(matches!(result, Err(CustomRedisError::Timeout)));
    }

    #[tokio::test]
    async fn test_prefixes_count_independently() {
        let redis = MemoryRedisClient::new();
        let generator = SequenceGenerator::new(Arc::new(redis));
        let now = at(2024, 6, 1, 8, 0, 0);

        let order = generator.next_id_at("order", now).await.unwrap();
        let refund = generator.next_id_at("refund", now).await.unwrap();

        assert_eq!(decompose(order).1, 1);
        assert_eq!(decompose(refund).1, 1);
    }
}
