//! Runs against a real Postgres: `DATABASE_URL=... cargo test -- --ignored`

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use common_redis::MemoryRedisClient;
use flash_deals::config::DEFAULT_TEST_CONFIG;
use flash_deals::errors::{OrderError, StoreError};
use flash_deals::orders::VoucherOrderService;
use flash_deals::store::{OrderStore, PgStore, ShopStore, VoucherOrder};
use flash_deals::test_utils::{
    insert_shop_in_pg, insert_voucher_in_pg, open_voucher, random_id, test_shop, user_ctx,
};

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_shop_read_and_update(db: PgPool) {
    let store = PgStore::new(db.clone());
    let shop = test_shop(random_id());
    insert_shop_in_pg(&db, &shop).await.unwrap();

    let loaded = store.get_shop(shop.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, shop.name);
    assert!(store.get_shop(shop.id + 1).await.unwrap().is_none());

    let mut renamed = loaded.clone();
    renamed.name = "Renamed".to_string();
    assert!(store.update_shop(&renamed).await.unwrap());
    assert_eq!(
        store.get_shop(shop.id).await.unwrap().unwrap().name,
        "Renamed"
    );

    let mut missing = renamed;
    missing.id += 1;
    assert!(!store.update_shop(&missing).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_decrement_stops_at_zero(db: PgPool) {
    let store = PgStore::new(db.clone());
    insert_voucher_in_pg(&db, &open_voucher(1, 1)).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.decrement_stock(1).await.unwrap(), 1);
    assert_eq!(tx.decrement_stock(1).await.unwrap(), 0);
    tx.commit().await.unwrap();

    assert_eq!(store.get_voucher(1).await.unwrap().unwrap().stock, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_unique_constraint_reports_duplicate_order(db: PgPool) {
    let store = PgStore::new(db.clone());
    insert_voucher_in_pg(&db, &open_voucher(1, 10)).await.unwrap();

    let order = |id| VoucherOrder {
        id,
        user_id: 7,
        voucher_id: 1,
        create_time: Utc::now(),
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order(1)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(matches!(
        tx.insert_order(&order(2)).await,
        Err(StoreError::DuplicateOrder)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_rolled_back_order_leaves_stock_untouched(db: PgPool) {
    let store = PgStore::new(db.clone());
    insert_voucher_in_pg(&db, &open_voucher(1, 3)).await.unwrap();

    {
        let mut tx = store.begin().await.unwrap();
        tx.decrement_stock(1).await.unwrap();
    }

    assert_eq!(store.get_voucher(1).await.unwrap().unwrap().stock, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_place_orders_against_postgres(db: PgPool) {
    insert_voucher_in_pg(&db, &open_voucher(1, 2)).await.unwrap();
    let service = Arc::new(VoucherOrderService::new(
        Arc::new(PgStore::new(db.clone())),
        Arc::new(MemoryRedisClient::new()),
        DEFAULT_TEST_CONFIG.admission_config(),
    ));

    let handles: Vec<_> = (1..=6)
        .map(|user_id| {
            let service = service.clone();
            tokio::spawn(async move { service.place_order(&user_ctx(user_id), 1).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(OrderError::OutOfStock) => {}
            Err(e) => panic!("unexpected failure: {e:?}"),
        }
    }
    assert_eq!(succeeded, 2);

    let (stock,): (i32,) =
        sqlx::query_as("SELECT stock FROM tb_seckill_voucher WHERE voucher_id = 1")
            .fetch_one(&db)
            .await
            .unwrap();
    assert_eq!(stock, 0);

    let again = service.place_order(&user_ctx(1), 1).await;
    assert!(matches!(
        again,
        Err(OrderError::OutOfStock | OrderError::AlreadyPurchased)
    ));
}
