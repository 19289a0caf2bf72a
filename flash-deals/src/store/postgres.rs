use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{OrderStore, OrderTransaction, SeckillVoucher, Shop, ShopStore, VoucherOrder};
use crate::errors::StoreError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShopStore for PgStore {
    async fn get_shop(&self, id: i64) -> Result<Option<Shop>, StoreError> {
        let query = r#"
            SELECT id, name, type_id, images, area, address, x, y, avg_price,
                   sold, comments, score, open_hours, update_time
              FROM tb_shop
             WHERE id = $1
        "#;
        let shop = sqlx::query_as::<_, Shop>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(shop)
    }

    async fn update_shop(&self, shop: &Shop) -> Result<bool, StoreError> {
        let query = r#"
            UPDATE tb_shop
               SET name = $2, type_id = $3, images = $4, area = $5, address = $6,
                   x = $7, y = $8, avg_price = $9, sold = $10, comments = $11,
                   score = $12, open_hours = $13, update_time = now()
             WHERE id = $1
        "#;
        let res = sqlx::query(query)
            .bind(shop.id)
            .bind(&shop.name)
            .bind(shop.type_id)
            .bind(&shop.images)
            .bind(&shop.area)
            .bind(&shop.address)
            .bind(shop.x)
            .bind(shop.y)
            .bind(shop.avg_price)
            .bind(shop.sold)
            .bind(shop.comments)
            .bind(shop.score)
            .bind(&shop.open_hours)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn get_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>, StoreError> {
        let query = r#"
            SELECT voucher_id, stock, begin_time, end_time
              FROM tb_seckill_voucher
             WHERE voucher_id = $1
        "#;
        let voucher = sqlx::query_as::<_, SeckillVoucher>(query)
            .bind(voucher_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(voucher)
    }

    async fn begin(&self) -> Result<Box<dyn OrderTransaction + Send>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgOrderTransaction { tx }))
    }
}

pub struct PgOrderTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTransaction for PgOrderTransaction {
    async fn count_orders(&mut self, user_id: i64, voucher_id: i64) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tb_voucher_order WHERE user_id = $1 AND voucher_id = $2",
        )
        .bind(user_id)
        .bind(voucher_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn decrement_stock(&mut self, voucher_id: i64) -> Result<u64, StoreError> {
        let res = sqlx::query(
            "UPDATE tb_seckill_voucher SET stock = stock - 1 WHERE voucher_id = $1 AND stock > 0",
        )
        .bind(voucher_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected())
    }

    async fn insert_order(&mut self, order: &VoucherOrder) -> Result<(), StoreError> {
        let res = sqlx::query(
            "INSERT INTO tb_voucher_order (id, user_id, voucher_id, create_time) VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.voucher_id)
        .bind(order.create_time)
        .execute(&mut *self.tx)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if common_database::is_unique_violation(&e) => Err(StoreError::DuplicateOrder),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
