pub const SEQUENCE_IDS_ISSUED_COUNTER: &str = "sequence_ids_issued_total";
pub const VOUCHER_ORDERS_COUNTER: &str = "voucher_orders_total";
pub const VOUCHER_ORDER_TIME: &str = "voucher_order_duration_ms";
pub const SHOP_WARMED_COUNTER: &str = "shop_cache_warmed_total";
