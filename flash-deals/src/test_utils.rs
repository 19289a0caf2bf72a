use anyhow::Error;
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::PgPool;

use crate::context::{RequestContext, UserDto};
use crate::store::{SeckillVoucher, Shop};

pub fn random_id() -> i64 {
    rand::thread_rng().gen_range(1..10_000_000)
}

pub fn user_ctx(user_id: i64) -> RequestContext {
    RequestContext::for_user(UserDto {
        id: user_id,
        nick_name: format!("user_{user_id}"),
        icon: String::new(),
    })
}

pub fn test_shop(id: i64) -> Shop {
    Shop {
        id,
        name: format!("Shop {id}"),
        type_id: 1,
        images: "https://img.example.com/shop.jpg".to_string(),
        area: Some("Downtown".to_string()),
        address: "1 Market Street".to_string(),
        x: 120.149_192,
        y: 30.316_078,
        avg_price: Some(80),
        sold: 4215,
        comments: 3035,
        score: 37,
        open_hours: Some("10:00-22:00".to_string()),
        update_time: Utc::now(),
    }
}

/// A voucher whose sale window is open for the next hour
pub fn open_voucher(voucher_id: i64, stock: i32) -> SeckillVoucher {
    let now = Utc::now();
    SeckillVoucher {
        voucher_id,
        stock,
        begin_time: now - Duration::hours(1),
        end_time: now + Duration::hours(1),
    }
}

pub async fn insert_shop_in_pg(pool: &PgPool, shop: &Shop) -> Result<(), Error> {
    let res = sqlx::query(
        r#"INSERT INTO tb_shop
            (id, name, type_id, images, area, address, x, y, avg_price, sold, comments, score, open_hours, update_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
    )
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
    .bind(shop.update_time)
    .execute(pool)
    .await?;
    assert_eq!(res.rows_affected(), 1);
    Ok(())
}

pub async fn insert_voucher_in_pg(pool: &PgPool, voucher: &SeckillVoucher) -> Result<(), Error> {
    let res = sqlx::query(
        "INSERT INTO tb_seckill_voucher (voucher_id, stock, begin_time, end_time) VALUES ($1, $2, $3, $4)",
    )
    .bind(voucher.voucher_id)
    .bind(voucher.stock)
    .bind(voucher.begin_time)
    .bind(voucher.end_time)
    .execute(pool)
    .await?;
    assert_eq!(res.rows_affected(), 1);
    Ok(())
}
