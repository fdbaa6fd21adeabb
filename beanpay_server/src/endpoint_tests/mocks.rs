use beanpay_engine::{
    db_types::{
        Customer,
        LineItem,
        NewOrder,
        Order,
        OrderStatus,
        OrderUpdate,
        PaymentMethod,
        ProviderOrderId,
        TransactionId,
    },
    traits::{
        Authorization,
        AuthorizeRequest,
        CaptureMode,
        MerchantContext,
        OrderStore,
        OrderStoreError,
        PaymentProvider,
        ProviderError,
    },
};
use bp_common::{Money, Secret};
use chrono::Utc;
use mockall::mock;

use crate::config::{MerchantCredentials, ServerConfig};

pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

mock! {
    pub OrderDb {}

    impl OrderStore for OrderDb {
        async fn create_order(&self, order: NewOrder) -> Result<Order, OrderStoreError>;
        async fn update_order(&self, id: &TransactionId, update: OrderUpdate) -> Result<Order, OrderStoreError>;
        async fn fetch_order(&self, id: &TransactionId) -> Result<Option<Order>, OrderStoreError>;
        async fn fetch_orders_by_provider_order_id(
            &self,
            id: &ProviderOrderId,
        ) -> Result<Vec<Order>, OrderStoreError>;
        async fn delete_order(&self, id: &TransactionId) -> Result<(), OrderStoreError>;
    }
}

mock! {
    pub Pay {}

    impl PaymentProvider for Pay {
        fn name(&self) -> &'static str;
        fn capture_mode(&self) -> CaptureMode;
        async fn authorize(&self, request: AuthorizeRequest) -> Result<Authorization, ProviderError>;
        async fn create_merchant_order(
            &self,
            items: &[LineItem],
            merchant: &MerchantContext,
        ) -> Result<Option<ProviderOrderId>, ProviderError>;
        async fn capture(&self, provider_txid: &TransactionId) -> Result<Money, ProviderError>;
        async fn cancel_or_refund(&self, provider_txid: &TransactionId) -> Result<Option<String>, ProviderError>;
        fn post_capture_status(&self) -> OrderStatus;
        fn map_order_state(&self, state: &str) -> OrderStatus;
        fn map_fulfillment_state(&self, state: &str) -> OrderStatus;
    }
}

pub fn quiet_pay_mock() -> MockPay {
    let mut pay = MockPay::new();
    pay.expect_name().return_const("mockpay");
    pay
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.webhook.hmac_secret = Secret::new(TEST_WEBHOOK_SECRET.to_string());
    config.webhook.hmac_checks = true;
    config.merchants.push(MerchantCredentials {
        merchant_id: "coffee-corner".to_string(),
        shop_name: Some("Coffee Corner".to_string()),
        location_id: Some("L123".to_string()),
        application_id: Some("sq0idp-abc".to_string()),
        access_token: Some("sq0atp-secret".to_string()),
    });
    config
}

pub fn an_order(txid: &str, status: OrderStatus, payment_method: PaymentMethod) -> Order {
    Order {
        transaction_id: TransactionId::from(txid),
        provider_order_id: Some(ProviderOrderId::from(format!("sq-{txid}"))),
        status,
        amount: Money::from(450),
        currency: "USD".to_string(),
        merchant_id: "coffee-corner".to_string(),
        payment_method,
        items: vec![LineItem::new("Latte", 1, Money::from(450))],
        customer: Some(Customer { name: Some("Ana".to_string()), email: Some("ana@example.com".to_string()) }),
        receipt_url: None,
        receipt_number: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// The record the store hands back for a freshly created order.
pub fn order_from(new_order: NewOrder) -> Order {
    Order {
        transaction_id: new_order.transaction_id,
        provider_order_id: new_order.provider_order_id,
        status: new_order.status,
        amount: new_order.amount,
        currency: new_order.currency,
        merchant_id: new_order.merchant_id,
        payment_method: new_order.payment_method,
        items: new_order.items,
        customer: new_order.customer,
        receipt_url: new_order.receipt_url,
        receipt_number: new_order.receipt_number,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
