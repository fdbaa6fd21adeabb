use actix_web::{http::StatusCode, test, web, App};
use beanpay_engine::{
    db_types::{OrderStatus, PaymentMethod, ProviderOrderId, TransactionId},
    events::EventProducers,
    traits::{Authorization, CaptureMode, DeclineReason, ProviderError},
    CaptureScheduler,
    OrderFlowApi,
};
use serde_json::{json, Value};

use crate::{
    endpoint_tests::mocks::{an_order, order_from, quiet_pay_mock, test_config, MockOrderDb, MockPay},
    routes::{cancel_order, capture_order, merchant_credentials, place_order, ProviderRegistry},
};

macro_rules! order_app {
    ($db:expr, $registry:expr, $scheduler:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(OrderFlowApi::new($db, EventProducers::default())))
                .app_data(web::Data::new($registry))
                .app_data(web::Data::new($scheduler))
                .app_data(web::Data::new(test_config()))
                .route("/merchants/{merchant_id}/credentials", web::get().to(merchant_credentials))
                .route("/orders", web::post().to(place_order::<MockOrderDb, MockPay, MockPay, MockPay>))
                .route("/orders/cancel", web::post().to(cancel_order::<MockOrderDb, MockPay, MockPay, MockPay>))
                .route("/orders/capture", web::post().to(capture_order::<MockOrderDb, MockPay, MockPay, MockPay>)),
        )
        .await
    };
}

#[actix_web::test]
async fn placing_a_card_order_goes_through_square() {
    let mut db = MockOrderDb::new();
    db.expect_create_order().times(1).returning(|new_order| Ok(order_from(new_order)));
    let mut square = quiet_pay_mock();
    square.expect_authorize().times(1).returning(|_| {
        Ok(Authorization {
            provider_transaction_id: TransactionId::from("T100"),
            status: OrderStatus::Submitted,
            receipt_url: Some("https://sq.example/r/1".to_string()),
            receipt_number: None,
        })
    });
    square.expect_create_merchant_order().times(1).returning(|_, _| Ok(Some(ProviderOrderId::from("sq-100"))));
    square.expect_capture_mode().return_const(CaptureMode::Immediate);
    let registry = ProviderRegistry::new(square, MockPay::new(), MockPay::new());
    let (scheduler, _rx) = CaptureScheduler::with_channel(4);
    let app = order_app!(db, registry, scheduler.clone());

    let body = json!({
        "nonce": "cnon:card-ok",
        "amount": 450,
        "merchant_id": "coffee-corner",
        "payment_method": "card",
        "items": [{"name": "Latte", "quantity": 1, "unit_price": 450}]
    });
    let req = test::TestRequest::post().uri("/orders").set_json(&body).to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response["success"], true);
    assert_eq!(response["transaction_id"], "T100");
    assert_eq!(response["order_id"], "sq-100");
    assert_eq!(response["status"], "SUBMITTED");
    assert_eq!(response["amount"], 450);
    // Immediate-capture providers never arm the auto-capture timer.
    assert_eq!(scheduler.pending_count(), 0);
}

#[actix_web::test]
async fn placing_an_apple_pay_order_arms_the_capture_timer() {
    let mut db = MockOrderDb::new();
    db.expect_create_order().times(1).returning(|new_order| Ok(order_from(new_order)));
    let mut stripe = quiet_pay_mock();
    stripe.expect_authorize().times(1).returning(|_| {
        Ok(Authorization {
            provider_transaction_id: TransactionId::from("pi_200"),
            status: OrderStatus::Authorized,
            receipt_url: None,
            receipt_number: None,
        })
    });
    stripe.expect_create_merchant_order().times(1).returning(|_, _| Ok(None));
    stripe.expect_capture_mode().return_const(CaptureMode::Deferred);
    let registry = ProviderRegistry::new(MockPay::new(), stripe, MockPay::new());
    let (scheduler, _rx) = CaptureScheduler::with_channel(4);
    let app = order_app!(db, registry, scheduler.clone());

    let body = json!({
        "token_id": "applepay-token",
        "amount": 725,
        "merchant_id": "coffee-corner",
        "payment_method": "apple_pay"
    });
    let req = test::TestRequest::post().uri("/orders").set_json(&body).to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response["status"], "AUTHORIZED");
    assert_eq!(scheduler.pending_count(), 1);
    scheduler.cancel(&TransactionId::from("pi_200"));
}

#[actix_web::test]
async fn a_declined_card_returns_402_with_a_sanitized_message() {
    let db = MockOrderDb::new();
    let mut square = quiet_pay_mock();
    square
        .expect_authorize()
        .times(1)
        .returning(|_| Err(ProviderError::Declined(DeclineReason::InsufficientFunds)));
    square.expect_create_merchant_order().never();
    let registry = ProviderRegistry::new(square, MockPay::new(), MockPay::new());
    let (scheduler, _rx) = CaptureScheduler::with_channel(4);
    let app = order_app!(db, registry, scheduler);

    let body = json!({
        "nonce": "cnon:card-declined",
        "amount": 450,
        "merchant_id": "coffee-corner",
        "payment_method": "card"
    });
    let req = test::TestRequest::post().uri("/orders").set_json(&body).to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body: Value = test::read_body_json(response).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("insufficient funds"), "unexpected message: {message}");
    assert!(!message.contains("Stripe") && !message.contains("Square"));
}

#[actix_web::test]
async fn invalid_order_requests_fail_before_any_provider_call() {
    let db = MockOrderDb::new();
    let mut square = MockPay::new();
    square.expect_authorize().never();
    let registry = ProviderRegistry::new(square, MockPay::new(), MockPay::new());
    let (scheduler, _rx) = CaptureScheduler::with_channel(4);
    let app = order_app!(db, registry, scheduler);

    for body in [
        json!({"nonce": "tok", "amount": 0, "merchant_id": "coffee-corner", "payment_method": "card"}),
        json!({"nonce": "", "amount": 450, "merchant_id": "coffee-corner", "payment_method": "card"}),
        json!({"nonce": "tok", "amount": 450, "merchant_id": " ", "payment_method": "card"}),
    ] {
        let req = test::TestRequest::post().uri("/orders").set_json(&body).to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[actix_web::test]
async fn cancelling_an_order_routes_by_payment_method() {
    let mut db = MockOrderDb::new();
    // Once by the handler (to route on payment_method), once by the engine.
    db.expect_fetch_order()
        .times(2)
        .returning(|_| Ok(Some(an_order("pi_300", OrderStatus::Authorized, PaymentMethod::ApplePay))));
    db.expect_update_order()
        .times(1)
        .withf(|_, update| update.new_status == Some(OrderStatus::Cancelled))
        .returning(|_, _| Ok(an_order("pi_300", OrderStatus::Cancelled, PaymentMethod::ApplePay)));
    let mut stripe = quiet_pay_mock();
    stripe.expect_cancel_or_refund().times(1).returning(|_| Ok(None));
    let registry = ProviderRegistry::new(MockPay::new(), stripe, MockPay::new());
    let (scheduler, _rx) = CaptureScheduler::with_channel(4);
    let app = order_app!(db, registry, scheduler);

    let req = test::TestRequest::post().uri("/orders/cancel").set_json(json!({"paymentId": "pi_300"})).to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response["success"], true);
    assert!(response["message"].as_str().unwrap().contains("CANCELLED"));
}

#[actix_web::test]
async fn cancelling_an_unknown_order_is_a_404() {
    let mut db = MockOrderDb::new();
    db.expect_fetch_order().times(1).returning(|_| Ok(None));
    let registry = ProviderRegistry::new(MockPay::new(), MockPay::new(), MockPay::new());
    let (scheduler, _rx) = CaptureScheduler::with_channel(4);
    let app = order_app!(db, registry, scheduler);

    let req = test::TestRequest::post().uri("/orders/cancel").set_json(json!({"paymentId": "nope"})).to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn capturing_disarms_the_timer_and_advances_the_order() {
    let mut db = MockOrderDb::new();
    db.expect_fetch_order()
        .times(2)
        .returning(|_| Ok(Some(an_order("pi_400", OrderStatus::Authorized, PaymentMethod::ApplePay))));
    db.expect_update_order()
        .times(1)
        .withf(|_, update| update.new_status == Some(OrderStatus::Submitted))
        .returning(|_, _| Ok(an_order("pi_400", OrderStatus::Submitted, PaymentMethod::ApplePay)));
    let mut stripe = quiet_pay_mock();
    stripe.expect_capture().times(1).returning(|_| Ok(bp_common::Money::from(450)));
    stripe.expect_post_capture_status().return_const(OrderStatus::Submitted);
    let registry = ProviderRegistry::new(MockPay::new(), stripe, MockPay::new());
    let (scheduler, _rx) = CaptureScheduler::with_channel(4);
    scheduler.arm(TransactionId::from("pi_400"), std::time::Duration::from_secs(60));
    let app = order_app!(db, registry, scheduler.clone());

    let req = test::TestRequest::post().uri("/orders/capture").set_json(json!({"paymentId": "pi_400"})).to_request();
    let response: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(response["success"], true);
    assert_eq!(scheduler.pending_count(), 0);
}

#[actix_web::test]
async fn merchant_credentials_do_not_leak_secrets() {
    let db = MockOrderDb::new();
    let registry = ProviderRegistry::new(MockPay::new(), MockPay::new(), MockPay::new());
    let (scheduler, _rx) = CaptureScheduler::with_channel(4);
    let app = order_app!(db, registry, scheduler);

    let req = test::TestRequest::get().uri("/merchants/coffee-corner/credentials").to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["merchant_id"], "coffee-corner");
    assert_eq!(body["application_id"], "sq0idp-abc");
    assert_eq!(body["location_id"], "L123");
    assert!(body.to_string().find("sq0atp-secret").is_none());

    let req = test::TestRequest::get().uri("/merchants/nobody/credentials").to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
