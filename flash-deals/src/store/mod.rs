//! Backing relational store
//!
//! The services only see the traits below. [`PgStore`] is the production implementation;
//! [`MemoryStore`] keeps the same transactional guarantees in process for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub type_id: i64,
    pub images: String,
    pub area: Option<String>,
    pub address: String,
    pub x: f64,
    pub y: f64,
    pub avg_price: Option<i64>,
    pub sold: i32,
    pub comments: i32,
    pub score: i32,
    pub open_hours: Option<String>,
    pub update_time: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SeckillVoucher {
    pub voucher_id: i64,
    pub stock: i32,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SeckillVoucher {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.begin_time
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VoucherOrder {
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub create_time: DateTime<Utc>,
}

#[async_trait]
pub trait ShopStore: Send + Sync {
    async fn get_shop(&self, id: i64) -> Result<Option<Shop>, StoreError>;
    /// Returns false if no row has this shop's id.
    async fn update_shop(&self, shop: &Shop) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>, StoreError>;
    async fn begin(&self) -> Result<Box<dyn OrderTransaction + Send>, StoreError>;
}

/// One unit of work against the order tables. Dropping it without `commit` rolls back.
#[async_trait]
pub trait OrderTransaction: Send {
    async fn count_orders(&mut self, user_id: i64, voucher_id: i64) -> Result<i64, StoreError>;
    /// `stock = stock - 1 WHERE voucher_id = ? AND stock > 0`. Returns rows affected.
    async fn decrement_stock(&mut self, voucher_id: i64) -> Result<u64, StoreError>;
    /// Fails with [`StoreError::DuplicateOrder`] if the (user, voucher) pair already has an order.
    async fn insert_order(&mut self, order: &VoucherOrder) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
