use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use std::time::Duration;

use crate::{Client, CustomRedisError};

/// Redis-backed implementation of [`Client`].
///
/// Values are stored as plain UTF-8 strings so that the empty-string sentinel written by the
/// pass-through cache survives a round trip unchanged.
pub struct RedisClient {
    connection: MultiplexedConnection,
}

impl RedisClient {
    /// Connect with no response or connection timeout.
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        Self::with_config(addr, None, None).await
    }

    /// Connect with explicit timeouts.
    ///
    /// `None` means no timeout. `Some(Duration::ZERO)` is rejected with
    /// `CustomRedisError::InvalidConfiguration`.
    ///
    /// ```no_run
    /// use common_redis::RedisClient;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let client = RedisClient::with_config(
    ///     "redis://localhost:6379".to_string(),
    ///     Some(Duration::from_millis(500)),
    ///     Some(Duration::from_millis(5000)),
    /// )
    /// .await
    /// .unwrap();
    /// # }
    /// ```
    pub async fn with_config(
        addr: String,
        response_timeout: Option<Duration>,
        connection_timeout: Option<Duration>,
    ) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;

        if response_timeout.is_some_and(|t| t.is_zero()) {
            return Err(CustomRedisError::InvalidConfiguration(
                "Redis response timeout cannot be Duration::ZERO - use None for no timeout"
                    .to_string(),
            ));
        }
        if connection_timeout.is_some_and(|t| t.is_zero()) {
            return Err(CustomRedisError::InvalidConfiguration(
                "Redis connection timeout cannot be Duration::ZERO - use None for no timeout"
                    .to_string(),
            ));
        }

        let mut config = redis::AsyncConnectionConfig::new();
        if let Some(timeout) = response_timeout {
            config = config.set_response_timeout(timeout);
        }
        if let Some(timeout) = connection_timeout {
            config = config.set_connection_timeout(timeout);
        }

        let connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;

        Ok(RedisClient { connection })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut conn = self.connection.clone();
        let raw: Option<Vec<u8>> = conn.get(k).await?;

        // nil is a miss; an empty value is a legitimate sentinel and is returned as-is
        match raw {
            Some(bytes) => Ok(String::from_utf8(bytes)?),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(k, v).await?;
        Ok(())
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(k, v, seconds).await?;
        Ok(())
    }

    async fn set_nx_ex(
        &self,
        k: String,
        v: String,
        seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        let mut conn = self.connection.clone();

        let result: Result<Option<String>, RedisError> = redis::cmd("SET")
            .arg(&k)
            .arg(&v)
            .arg("EX")
            .arg(seconds)
            .arg("NX")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(_)) => Ok(true), // Key was set by us
            Ok(None) => Ok(false),   // Key already existed
            Err(e) => Err(e.into()),
        }
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(k).await?;
        Ok(())
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let value: i64 = conn.incr(k, 1i64).await?;
        Ok(value)
    }
}
