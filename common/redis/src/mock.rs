use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{Client, CustomRedisError};

/// Scripted [`Client`] for unit tests.
///
/// Each operation answers from a per-key table configured up front. Unscripted reads return
/// `NotFound`, unscripted writes succeed, and unscripted `set_nx_ex` acquires. Every call is
/// recorded so tests can assert on the exact command sequence.
#[derive(Clone)]
pub struct MockRedisClient {
    get_ret: HashMap<String, Result<String, CustomRedisError>>,
    set_ret: HashMap<String, Result<(), CustomRedisError>>,
    set_nx_ex_ret: HashMap<String, Result<bool, CustomRedisError>>,
    del_ret: HashMap<String, Result<(), CustomRedisError>>,
    incr_ret: HashMap<String, Result<i64, CustomRedisError>>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

impl Default for MockRedisClient {
    fn default() -> Self {
        Self {
            get_ret: HashMap::new(),
            set_ret: HashMap::new(),
            set_nx_ex_ret: HashMap::new(),
            del_ret: HashMap::new(),
            incr_ret: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    // Helper method to safely lock the calls mutex
    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MockRedisCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, op: &str, key: &str, value: MockRedisValue) {
        self.lock_calls().push(MockRedisCall {
            op: op.to_string(),
            key: key.to_string(),
            value,
        });
    }

    pub fn get_ret(&mut self, key: &str, ret: Result<String, CustomRedisError>) -> Self {
        self.get_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    /// Scripts both `set` and `setex` for `key`.
    pub fn set_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.set_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn set_nx_ex_ret(&mut self, key: &str, ret: Result<bool, CustomRedisError>) -> Self {
        self.set_nx_ex_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn del_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.del_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn incr_ret(&mut self, key: &str, ret: Result<i64, CustomRedisError>) -> Self {
        self.incr_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        self.lock_calls().clone()
    }

    /// Calls recorded for a single operation name, in order.
    pub fn calls_for(&self, op: &str) -> Vec<MockRedisCall> {
        self.lock_calls()
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockRedisValue {
    None,
    String(String),
    StringWithTTL(String, u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
    pub value: MockRedisValue,
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, key: String) -> Result<String, CustomRedisError> {
        self.record("get", &key, MockRedisValue::None);

        self.get_ret
            .get(&key)
            .cloned()
            .unwrap_or(Err(CustomRedisError::NotFound))
    }

    async fn set(&self, key: String, value: String) -> Result<(), CustomRedisError> {
        self.record("set", &key, MockRedisValue::String(value));

        self.set_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn setex(
        &self,
        key: String,
        value: String,
        seconds: u64,
    ) -> Result<(), CustomRedisError> {
        self.record("setex", &key, MockRedisValue::StringWithTTL(value, seconds));

        self.set_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn set_nx_ex(
        &self,
        key: String,
        value: String,
        seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        self.record(
            "set_nx_ex",
            &key,
            MockRedisValue::StringWithTTL(value, seconds),
        );

        self.set_nx_ex_ret.get(&key).cloned().unwrap_or(Ok(true))
    }

    async fn del(&self, key: String) -> Result<(), CustomRedisError> {
        self.record("del", &key, MockRedisValue::None);

        self.del_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn incr(&self, key: String) -> Result<i64, CustomRedisError> {
        self.record("incr", &key, MockRedisValue::None);

        self.incr_ret.get(&key).cloned().unwrap_or(Ok(1))
    }
}
