use common_cache::CacheError;
use common_redis::CustomRedisError;
use thiserror::Error;

/// Failures from the backing relational store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The (user, voucher) uniqueness constraint rejected an insert
    #[error("order already exists for this user and voucher")]
    DuplicateOrder,
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(e) => common_database::is_transient_error(e),
            StoreError::DuplicateOrder => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("voucher {0} does not exist")]
    VoucherNotFound(i64),
    #[error("flash sale has not started")]
    NotStarted,
    #[error("flash sale has ended")]
    Ended,
    #[error("out of stock")]
    OutOfStock,
    #[error("user has already purchased this voucher")]
    AlreadyPurchased,
    #[error("no authenticated caller")]
    Unauthenticated,
    #[error("another order for this user is in progress")]
    Contended,
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("cache store failure: {0}")]
    Cache(#[from] CustomRedisError),
}

impl OrderError {
    /// Rejections decided by the sale's rules rather than by infrastructure.
    /// These are final for the request and never worth retrying.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            OrderError::VoucherNotFound(_)
                | OrderError::NotStarted
                | OrderError::Ended
                | OrderError::OutOfStock
                | OrderError::AlreadyPurchased
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            OrderError::Contended => true,
            OrderError::Store(e) => e.is_transient(),
            OrderError::Cache(e) => !e.is_unrecoverable_error(),
            _ => false,
        }
    }

    /// Stable identifier used for logs and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::VoucherNotFound(_) => "voucher_not_found",
            OrderError::NotStarted => "not_started",
            OrderError::Ended => "ended",
            OrderError::OutOfStock => "out_of_stock",
            OrderError::AlreadyPurchased => "already_purchased",
            OrderError::Unauthenticated => "unauthenticated",
            OrderError::Contended => "contended",
            OrderError::Store(_) => "store_error",
            OrderError::Cache(_) => "cache_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("shop not found")]
    NotFound,
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("cache store failure: {0}")]
    Cache(#[from] CustomRedisError),
}

impl From<CacheError<StoreError>> for ShopError {
    fn from(err: CacheError<StoreError>) -> Self {
        match err {
            CacheError::Loader(e) => ShopError::Store(e),
            CacheError::Store(e) => ShopError::Cache(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OrderError::NotStarted, "not_started", true, false)]
    #[case(OrderError::Ended, "ended", true, false)]
    #[case(OrderError::OutOfStock, "out_of_stock", true, false)]
    #[case(OrderError::AlreadyPurchased, "already_purchased", true, false)]
    #[case(OrderError::VoucherNotFound(7), "voucher_not_found", true, false)]
    #[case(OrderError::Unauthenticated, "unauthenticated", false, false)]
    #[case(OrderError::Contended, "contended", false, true)]
    #[case(OrderError::Cache(CustomRedisError::Timeout), "cache_error", false, true)]
    #[case(OrderError::Store(StoreError::DuplicateOrder), "store_error", false, false)]
    #[case(OrderError::Store(StoreError::Database(sqlx::Error::PoolTimedOut)), "store_error", false, true)]
    fn test_order_error_classification(
        #[case] err: OrderError,
        #[case] code: &str,
        #[case] business_rule: bool,
        #[case] retryable: bool,
    ) {
        assert_eq!(err.code(), code);
        assert_eq!(err.is_business_rule(), business_rule);
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn test_cache_error_maps_into_shop_error() {
        let from_loader: ShopError = CacheError::Loader(StoreError::DuplicateOrder).into();
        assert!(matches!(
            from_loader,
            ShopError::Store(StoreError::DuplicateOrder)
        ));

        let from_store: ShopError = CacheError::<StoreError>::Store(CustomRedisError::Timeout).into();
        assert!(matches!(from_store, ShopError::Cache(CustomRedisError::Timeout)));
    }
}
