use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// Re-exported so consumers can build CustomRedisError values in tests
pub use redis::ErrorKind as RedisErrorKind;

#[derive(Error, Debug, Clone)]
pub enum CustomRedisError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for CustomRedisError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CustomRedisError::Timeout
        } else {
            CustomRedisError::Redis(Arc::new(err))
        }
    }
}

impl From<std::string::FromUtf8Error> for CustomRedisError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        CustomRedisError::ParseError(err.to_string())
    }
}

impl CustomRedisError {
    /// Create a Redis error from an ErrorKind (primarily for testing)
    pub fn from_redis_kind(kind: redis::ErrorKind, description: &'static str) -> Self {
        CustomRedisError::Redis(Arc::new(redis::RedisError::from((kind, description))))
    }

    /// Whether retrying the same command can ever succeed.
    ///
    /// Timeouts and connection drops are transient. Configuration problems, bad payloads and
    /// authentication failures are not.
    pub fn is_unrecoverable_error(&self) -> bool {
        match self {
            CustomRedisError::Timeout => false,
            CustomRedisError::InvalidConfiguration(_) => true,
            CustomRedisError::ParseError(_) => true,
            CustomRedisError::NotFound => true,
            CustomRedisError::Redis(err) => {
                matches!(
                    err.kind(),
                    redis::ErrorKind::InvalidClientConfig | redis::ErrorKind::AuthenticationFailed
                ) || err.is_unrecoverable_error()
            }
        }
    }
}

/// The primitives the cache engine, the lock and the sequence generator need from the shared
/// key-value store. Every operation must be strongly consistent for a single key.
///
/// `get` distinguishes a missing key (`Err(NotFound)`) from a key holding the empty string
/// (`Ok("")`); the latter is the "confirmed absent" sentinel written by the pass-through cache.
#[async_trait]
pub trait Client {
    async fn get(&self, k: String) -> Result<String, CustomRedisError>;
    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError>;
    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError>;
    /// SET k v EX seconds NX. Returns true iff this call created the key.
    async fn set_nx_ex(&self, k: String, v: String, seconds: u64)
        -> Result<bool, CustomRedisError>;
    async fn del(&self, k: String) -> Result<(), CustomRedisError>;
    /// INCR k. Missing keys start from zero, so the first call returns 1.
    async fn incr(&self, k: String) -> Result<i64, CustomRedisError>;
}

mod client;
mod memory;
mod mock;

pub use client::RedisClient;
pub use memory::MemoryRedisClient;
pub use mock::{MockRedisCall, MockRedisClient, MockRedisValue};
