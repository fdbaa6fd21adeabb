use beanpay_engine::{
    db_types::{LineItem, NewOrder, OrderStatus, PaymentMethod, ProviderOrderId, TransactionId},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    SqliteDatabase,
};
use bp_common::Money;

/// A fresh, migrated sqlite database at a unique temp path.
pub async fn prepare_db() -> SqliteDatabase {
    prepare_test_env(&random_db_path()).await
}

pub fn latte_order(txid: &str, status: OrderStatus) -> NewOrder {
    NewOrder::new(
        TransactionId::from(txid),
        status,
        Money::from(450),
        "coffee-corner".to_string(),
        PaymentMethod::ApplePay,
    )
    .with_items(vec![LineItem::new("Latte", 1, Money::from(450)).with_note("oat milk")])
    .with_provider_order_id(ProviderOrderId::from(format!("sq-{txid}")))
}
