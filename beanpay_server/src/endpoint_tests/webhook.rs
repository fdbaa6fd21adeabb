use actix_web::{http::StatusCode, test, web, App, HttpResponse};
use beanpay_engine::{
    db_types::{OrderStatus, PaymentMethod},
    events::EventProducers,
    OrderFlowApi,
};
use bp_common::Secret;
use serde_json::Value;

use crate::{
    endpoint_tests::mocks::{an_order, MockOrderDb, TEST_WEBHOOK_SECRET},
    helpers::calculate_hmac,
    middleware::HmacMiddlewareFactory,
    server::WEBHOOK_HMAC_HEADER,
    webhook::order_webhook,
};

macro_rules! webhook_app {
    ($db:expr) => {
        test::init_service(
            App::new().app_data(web::Data::new(OrderFlowApi::new($db, EventProducers::default()))).service(
                web::scope("/webhook")
                    .wrap(HmacMiddlewareFactory::new(
                        WEBHOOK_HMAC_HEADER,
                        Secret::new(TEST_WEBHOOK_SECRET.to_string()),
                        true,
                    ))
                    .route("/orders", web::post().to(order_webhook::<MockOrderDb>)),
            ),
        )
        .await
    };
}

fn signed(body: &'static str) -> test::TestRequest {
    let signature = calculate_hmac(TEST_WEBHOOK_SECRET, body.as_bytes());
    test::TestRequest::post()
        .uri("/webhook/orders")
        .insert_header(("content-type", "application/json"))
        .insert_header((WEBHOOK_HMAC_HEADER, signature))
        .set_payload(body)
}

const PREPARED_EVENT: &str = r#"{"type": "order.fulfillment.updated", "data": {"object": {"fulfillment_updated": {
    "order_id": "sq-T1",
    "fulfillment_update": [{"old_state": "RESERVED", "new_state": "PREPARED"}]
}}}}"#;

#[actix_web::test]
async fn unsigned_deliveries_are_rejected() {
    let db = MockOrderDb::new();
    let app = webhook_app!(db);
    let req = test::TestRequest::post()
        .uri("/webhook/orders")
        .insert_header(("content-type", "application/json"))
        .set_payload(PREPARED_EVENT)
        .to_request();
    // The middleware rejects with an `Err`, which the real server renders as a 401 response;
    // `test::call_service` would panic on it, so take the error path explicitly.
    let err = test::try_call_service(&app, req).await.err().expect("an unsigned delivery must be rejected");
    let response = HttpResponse::from(err);
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn tampered_deliveries_are_rejected() {
    let db = MockOrderDb::new();
    let app = webhook_app!(db);
    let bad_signature = calculate_hmac("some-other-secret", PREPARED_EVENT.as_bytes());
    let req = test::TestRequest::post()
        .uri("/webhook/orders")
        .insert_header(("content-type", "application/json"))
        .insert_header((WEBHOOK_HMAC_HEADER, bad_signature))
        .set_payload(PREPARED_EVENT)
        .to_request();
    let err = test::try_call_service(&app, req).await.err().expect("a tampered delivery must be rejected");
    let response = HttpResponse::from(err);
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn a_prepared_fulfillment_moves_the_order_to_ready() {
    let mut db = MockOrderDb::new();
    db.expect_fetch_orders_by_provider_order_id()
        .times(1)
        .returning(|_| Ok(vec![an_order("T1", OrderStatus::InProgress, PaymentMethod::Card)]));
    db.expect_update_order()
        .times(1)
        .withf(|_, update| update.new_status == Some(OrderStatus::Ready))
        .returning(|_, _| Ok(an_order("T1", OrderStatus::Ready, PaymentMethod::Card)));
    let app = webhook_app!(db);
    let response: Value = test::call_and_read_body_json(&app, signed(PREPARED_EVENT).to_request()).await;
    assert_eq!(response["success"], true);
    assert!(response["message"].as_str().unwrap().contains("READY"));
}

#[actix_web::test]
async fn events_for_unknown_orders_still_answer_200() {
    let mut db = MockOrderDb::new();
    db.expect_fetch_orders_by_provider_order_id().times(1).returning(|_| Ok(vec![]));
    db.expect_update_order().never();
    let app = webhook_app!(db);
    let response = test::call_service(&app, signed(PREPARED_EVENT).to_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[actix_web::test]
async fn stale_events_answer_200_without_writing() {
    let mut db = MockOrderDb::new();
    db.expect_fetch_orders_by_provider_order_id()
        .times(1)
        .returning(|_| Ok(vec![an_order("T1", OrderStatus::Cancelled, PaymentMethod::Card)]));
    db.expect_update_order().never();
    let app = webhook_app!(db);
    let response: Value = test::call_and_read_body_json(&app, signed(PREPARED_EVENT).to_request()).await;
    assert_eq!(response["success"], true);
    assert!(response["message"].as_str().unwrap().contains("CANCELLED"));
}

#[actix_web::test]
async fn order_created_events_are_acknowledged_without_state_effect() {
    let mut db = MockOrderDb::new();
    db.expect_fetch_orders_by_provider_order_id().never();
    db.expect_update_order().never();
    let app = webhook_app!(db);
    let body: &str = r#"{"type": "order.created", "data": {"object": {"order_created": {"order_id": "sq-T9"}}}}"#;
    let response = test::call_service(&app, signed(body).to_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[actix_web::test]
async fn malformed_payloads_with_a_valid_signature_are_a_400() {
    let db = MockOrderDb::new();
    let app = webhook_app!(db);
    let body: &str = r#"{"this": "is not an event envelope"#;
    let response = test::call_service(&app, signed(body).to_request()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
