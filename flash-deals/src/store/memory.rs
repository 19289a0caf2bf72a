use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{OrderStore, OrderTransaction, SeckillVoucher, Shop, ShopStore, VoucherOrder};
use crate::errors::StoreError;

#[derive(Debug, Clone, Default)]
struct Tables {
    shops: HashMap<i64, Shop>,
    vouchers: HashMap<i64, SeckillVoucher>,
    orders: Vec<VoucherOrder>,
}

/// In-process store for tests.
///
/// Transactions hold the whole table set exclusively and work on a staged copy that replaces
/// the live tables on commit, so an uncommitted transaction leaves no trace. The
/// (user_id, voucher_id) uniqueness of orders is enforced like the database constraint.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_shop(&self, shop: Shop) {
        self.tables.lock().await.shops.insert(shop.id, shop);
    }

    pub async fn remove_shop(&self, id: i64) {
        self.tables.lock().await.shops.remove(&id);
    }

    pub async fn insert_voucher(&self, voucher: SeckillVoucher) {
        self.tables
            .lock()
            .await
            .vouchers
            .insert(voucher.voucher_id, voucher);
    }

    pub async fn voucher_stock(&self, voucher_id: i64) -> Option<i32> {
        self.tables
            .lock()
            .await
            .vouchers
            .get(&voucher_id)
            .map(|v| v.stock)
    }

    pub async fn orders(&self) -> Vec<VoucherOrder> {
        self.tables.lock().await.orders.clone()
    }
}

#[async_trait]
impl ShopStore for MemoryStore {
    async fn get_shop(&self, id: i64) -> Result<Option<Shop>, StoreError> {
        Ok(self.tables.lock().await.shops.get(&id).cloned())
    }

    async fn update_shop(&self, shop: &Shop) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.shops.get_mut(&shop.id) {
            Some(existing) => {
                *existing = shop.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>, StoreError> {
        Ok(self.tables.lock().await.vouchers.get(&voucher_id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn OrderTransaction + Send>, StoreError> {
        let live = self.tables.clone().lock_owned().await;
        let staged = live.clone();
        Ok(Box::new(MemoryTransaction { live, staged }))
    }
}

struct MemoryTransaction {
    live: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl OrderTransaction for MemoryTransaction {
    async fn count_orders(&mut self, user_id: i64, voucher_id: i64) -> Result<i64, StoreError> {
        let count = self
            .staged
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.voucher_id == voucher_id)
            .count();
        Ok(count as i64)
    }

    async fn decrement_stock(&mut self, voucher_id: i64) -> Result<u64, StoreError> {
        match self.staged.vouchers.get_mut(&voucher_id) {
            Some(voucher) if voucher.stock > 0 => {
                voucher.stock -= 1;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn insert_order(&mut self, order: &VoucherOrder) -> Result<(), StoreError> {
        let duplicate = self
            .staged
            .orders
            .iter()
            .any(|o| o.user_id == order.user_id && o.voucher_id == order.voucher_id);
        if duplicate {
            return Err(StoreError::DuplicateOrder);
        }
        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut live, staged } = *self;
        *live = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn voucher(id: i64, stock: i32) -> SeckillVoucher {
        let now = Utc::now();
        SeckillVoucher {
            voucher_id: id,
            stock,
            begin_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
        }
    }

    fn order(id: i64, user_id: i64, voucher_id: i64) -> VoucherOrder {
        VoucherOrder {
            id,
            user_id,
            voucher_id,
            create_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_commit_applies_staged_changes() {
        let store = MemoryStore::new();
        store.insert_voucher(voucher(1, 2)).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.decrement_stock(1).await.unwrap(), 1);
        tx.insert_order(&order(100, 7, 1)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.voucher_stock(1).await, Some(1));
        assert_eq!(store.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        store.insert_voucher(voucher(1, 2)).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.decrement_stock(1).await.unwrap();
            tx.insert_order(&order(100, 7, 1)).await.unwrap();
        }

        assert_eq!(store.voucher_stock(1).await, Some(2));
        assert!(store.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_stock_never_goes_negative() {
        let store = MemoryStore::new();
        store.insert_voucher(voucher(1, 1)).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.decrement_stock(1).await.unwrap(), 1);
        assert_eq!(tx.decrement_stock(1).await.unwrap(), 0);
        assert_eq!(tx.decrement_stock(404).await.unwrap(), 0);
        tx.commit().await.unwrap();

        assert_eq!(store.voucher_stock(1).await, Some(0));
    }

    #[tokio::test]
    async fn test_duplicate_order_is_rejected() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order(100, 7, 1)).await.unwrap();
        assert!(matches!(
            tx.insert_order(&order(101, 7, 1)).await,
            Err(StoreError::DuplicateOrder)
        ));
        tx.insert_order(&order(102, 8, 1)).await.unwrap();
        assert_eq!(tx.count_orders(7, 1).await.unwrap(), 1);
    }
}
