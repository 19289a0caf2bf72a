use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use common_redis::MemoryRedisClient;
use flash_deals::config::DEFAULT_TEST_CONFIG;
use flash_deals::errors::OrderError;
use flash_deals::orders::VoucherOrderService;
use flash_deals::store::MemoryStore;
use flash_deals::test_utils::{open_voucher, user_ctx};

async fn setup(stock: i32) -> (Arc<VoucherOrderService>, MemoryStore) {
    let store = MemoryStore::new();
    store.insert_voucher(open_voucher(1, stock)).await;
    let service = VoucherOrderService::new(
        Arc::new(store.clone()),
        Arc::new(MemoryRedisClient::new()),
        DEFAULT_TEST_CONFIG.admission_config(),
    );
    (Arc::new(service), store)
}

#[tokio::test]
async fn test_same_user_racing_for_last_voucher_gets_one_order() {
    let (service, store) = setup(1).await;
    let ctx = user_ctx(1001);

    let results = join_all((0..10).map(|_| service.place_order(&ctx, 1))).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(result, OrderError::AlreadyPurchased | OrderError::OutOfStock),
            "unexpected failure: {result:?}"
        );
    }
    assert_eq!(store.voucher_stock(1).await, Some(0));
    assert_eq!(store.orders().await.len(), 1);
}

#[tokio::test]
async fn test_same_user_with_plenty_of_stock_still_gets_one_order() {
    let (service, store) = setup(100).await;
    let ctx = user_ctx(1001);

    let results = join_all((0..10).map(|_| service.place_order(&ctx, 1))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, OrderError::AlreadyPurchased)));
    assert_eq!(store.voucher_stock(1).await, Some(99));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ten_users_five_vouchers() {
    let (service, store) = setup(5).await;

    let handles: Vec<_> = (1..=10)
        .map(|user_id| {
            let service = service.clone();
            tokio::spawn(async move { service.place_order(&user_ctx(user_id), 1).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(OrderError::OutOfStock) => out_of_stock += 1,
            Err(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(out_of_stock, 5);
    assert_eq!(store.voucher_stock(1).await, Some(0));

    let orders = store.orders().await;
    let ids: HashSet<_> = orders.iter().map(|o| o.id).collect();
    let users: HashSet<_> = orders.iter().map(|o| o.user_id).collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(users.len(), 5);
}
