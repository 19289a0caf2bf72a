//! Flash-sale order admission
//!
//! [`VoucherOrderService::place_order`] turns one caller's request for a limited-stock voucher
//! into at most one order. Eligibility and stock are pre-checked without any lock; the
//! authoritative steps run under a per-user [`KeyedMutexLock`] inside a single store
//! transaction:
//!
//! 1. no existing order for (user, voucher), else `AlreadyPurchased`
//! 2. `stock = stock - 1 WHERE stock > 0`, else `OutOfStock`
//! 3. insert the order with an id from the [`SequenceGenerator`]
//!
//! The conditional decrement is what keeps stock from going negative across any number of
//! instances. The user lock only stops one user from racing themself; if its TTL lapses the
//! unique (user_id, voucher_id) constraint still rejects the second order.

use chrono::Utc;
use common_cache::KeyedMutexLock;
use common_metrics::{inc, timing_guard};
use common_redis::Client as RedisClient;
use std::sync::Arc;
use tracing::instrument;

use crate::config::AdmissionConfig;
use crate::context::RequestContext;
use crate::errors::{OrderError, StoreError};
use crate::metrics_consts::{VOUCHER_ORDERS_COUNTER, VOUCHER_ORDER_TIME};
use crate::sequence::{SequenceGenerator, ORDER_ID_PREFIX};
use crate::store::{OrderStore, VoucherOrder};

pub struct VoucherOrderService {
    store: Arc<dyn OrderStore>,
    lock: KeyedMutexLock,
    sequence: SequenceGenerator,
    config: AdmissionConfig,
}

impl VoucherOrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        redis: Arc<dyn RedisClient + Send + Sync>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            store,
            lock: KeyedMutexLock::new(redis.clone(), config.lock_ttl_seconds),
            sequence: SequenceGenerator::new(redis),
            config,
        }
    }

    #[instrument(skip_all, fields(voucher_id = voucher_id))]
    pub async fn place_order(
        &self,
        ctx: &RequestContext,
        voucher_id: i64,
    ) -> Result<VoucherOrder, OrderError> {
        let timer = timing_guard(VOUCHER_ORDER_TIME, &[]);
        let result = self.admit(ctx, voucher_id).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        if let Err(e) = &result {
            if e.is_business_rule() {
                tracing::debug!(outcome, "Order rejected");
            } else {
                tracing::warn!(outcome, error = %e, "Order failed");
            }
        }
        inc(
            VOUCHER_ORDERS_COUNTER,
            &[("outcome".to_string(), outcome.to_string())],
            1,
        );
        timer.label("outcome", outcome).fin();

        result
    }

    async fn admit(&self, ctx: &RequestContext, voucher_id: i64) -> Result<VoucherOrder, OrderError> {
        let user_id = ctx.caller_id()?;

        let voucher = self
            .store
            .get_voucher(voucher_id)
            .await?
            .ok_or(OrderError::VoucherNotFound(voucher_id))?;

        // Advisory only: the conditional decrement below decides.
        let now = Utc::now();
        if !voucher.has_started(now) {
            return Err(OrderError::NotStarted);
        }
        if voucher.has_ended(now) {
            return Err(OrderError::Ended);
        }
        if voucher.stock < 1 {
            return Err(OrderError::OutOfStock);
        }

        let lock_key = format!("{}{}", self.config.lock_prefix, user_id);
        let acquired = self
            .lock
            .acquire_with_retry(&lock_key, self.config.lock_attempts, self.config.lock_backoff)
            .await?;
        if !acquired {
            return Err(OrderError::Contended);
        }

        match self
            .lock
            .run_then_release(&lock_key, self.create_order(user_id, voucher_id))
            .await
        {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn create_order(&self, user_id: i64, voucher_id: i64) -> Result<VoucherOrder, OrderError> {
        let mut tx = self.store.begin().await?;

        if tx.count_orders(user_id, voucher_id).await? > 0 {
            return Err(OrderError::AlreadyPurchased);
        }

        if tx.decrement_stock(voucher_id).await? == 0 {
            return Err(OrderError::OutOfStock);
        }

        let order = VoucherOrder {
            id: self.sequence.next_id(ORDER_ID_PREFIX).await?,
            user_id,
            voucher_id,
            create_time: Utc::now(),
        };

        match tx.insert_order(&order).await {
            Ok(()) => {}
            Err(StoreError::DuplicateOrder) => return Err(OrderError::AlreadyPurchased),
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;

        tracing::info!(order_id = order.id, user_id, voucher_id, "Order placed");
        Ok(order)
    }
}
