//! Request handlers for the client-facing API.
//!
//! Handlers are generic over the order store and the three provider adapters so the endpoint
//! tests can swap in mocks; the server instantiates them with `SqliteDatabase` and the real
//! adapters. All validation happens here, before any external call is made.

use actix_web::{get, web, HttpResponse, Responder};
use beanpay_engine::{
    db_types::{Order, PaymentMethod, TransactionId},
    traits::{CaptureMode, OrderStore, PaymentProvider},
    CaptureScheduler,
    NewOrderRequest,
    OrderFlowApi,
    OrderFlowError,
};
use bp_common::Money;
use log::*;

use crate::{
    config::ServerConfig,
    data_objects::{JsonResponse, MerchantCredentialsResponse, OrderActionRequest, PlaceOrderRequest, PlaceOrderResponse},
    errors::ServerError,
};

/// The three provider adapters, one per payment method. Card payments go to Square, Apple Pay
/// tokens to Stripe, and merchants with their own POS to the bridge adapter.
pub struct ProviderRegistry<S, T, E> {
    pub square: S,
    pub stripe: T,
    pub external_pos: E,
}

impl<S, T, E> ProviderRegistry<S, T, E>
where
    S: PaymentProvider,
    T: PaymentProvider,
    E: PaymentProvider,
{
    pub fn new(square: S, stripe: T, external_pos: E) -> Self {
        Self { square, stripe, external_pos }
    }
}

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("👍️ Heeeelllo");
    HttpResponse::Ok().body("👍️\n")
}

/// GET /merchants/{merchant_id}/credentials
pub async fn merchant_credentials(
    path: web::Path<String>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let merchant_id = path.into_inner();
    if merchant_id.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("merchant_id must not be empty".to_string()));
    }
    let creds = config
        .merchant(&merchant_id)
        .ok_or_else(|| ServerError::NoRecordFound(format!("Merchant {merchant_id}")))?;
    let response = MerchantCredentialsResponse {
        merchant_id: creds.merchant_id.clone(),
        shop_name: creds.shop_name.clone(),
        location_id: creds.location_id.clone(),
        application_id: creds.application_id.clone(),
        environment: format!("{:?}", config.environment).to_lowercase(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// POST /orders
pub async fn place_order<B, S, T, E>(
    body: web::Json<PlaceOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
    providers: web::Data<ProviderRegistry<S, T, E>>,
    scheduler: web::Data<CaptureScheduler>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderStore + 'static,
    S: PaymentProvider + 'static,
    T: PaymentProvider + 'static,
    E: PaymentProvider + 'static,
{
    let body = body.into_inner();
    if body.source_token.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("A payment token is required".to_string()));
    }
    if body.amount <= 0 {
        return Err(ServerError::InvalidRequestBody("amount must be a positive number of minor units".to_string()));
    }
    if body.merchant_id.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("merchant_id must not be empty".to_string()));
    }
    let request = NewOrderRequest {
        source_token: body.source_token,
        amount: Money::from(body.amount),
        currency: body.currency.unwrap_or_else(|| "USD".to_string()),
        merchant: config.merchant_context(&body.merchant_id),
        payment_method: body.payment_method,
        items: body.items,
        customer: body.customer,
    };
    let order = match body.payment_method {
        PaymentMethod::Card => place_with(api.get_ref(), &providers.square, &scheduler, &config, request).await,
        PaymentMethod::ApplePay => place_with(api.get_ref(), &providers.stripe, &scheduler, &config, request).await,
        PaymentMethod::External => {
            place_with(api.get_ref(), &providers.external_pos, &scheduler, &config, request).await
        },
    }?;
    let response = PlaceOrderResponse {
        success: true,
        transaction_id: order.transaction_id.clone(),
        order_id: order.provider_order_id.clone(),
        status: order.status,
        amount: order.amount,
        currency: order.currency.clone(),
        receipt_url: order.receipt_url.clone(),
    };
    Ok(HttpResponse::Ok().json(response))
}

async fn place_with<B: OrderStore, P: PaymentProvider>(
    api: &OrderFlowApi<B>,
    provider: &P,
    scheduler: &CaptureScheduler,
    config: &ServerConfig,
    request: NewOrderRequest,
) -> Result<Order, OrderFlowError> {
    let order = api.place_order(provider, request).await?;
    if provider.capture_mode() == CaptureMode::Deferred && !order.status.is_terminal() {
        debug!(
            "🛍️️ Arming auto-capture for [{}] in {:?} via {}",
            order.transaction_id,
            config.capture_delay,
            provider.name()
        );
        scheduler.arm(order.transaction_id.clone(), config.capture_delay);
    }
    Ok(order)
}

/// POST /orders/cancel
pub async fn cancel_order<B, S, T, E>(
    body: web::Json<OrderActionRequest>,
    api: web::Data<OrderFlowApi<B>>,
    providers: web::Data<ProviderRegistry<S, T, E>>,
    scheduler: web::Data<CaptureScheduler>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderStore + 'static,
    S: PaymentProvider + 'static,
    T: PaymentProvider + 'static,
    E: PaymentProvider + 'static,
{
    let txid = body.into_inner().payment_id;
    let order = api.fetch_order(&txid).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Order {txid}")))?;
    let order = match order.payment_method {
        PaymentMethod::Card => api.cancel_order(&providers.square, &scheduler, &txid).await,
        PaymentMethod::ApplePay => api.cancel_order(&providers.stripe, &scheduler, &txid).await,
        PaymentMethod::External => api.cancel_order(&providers.external_pos, &scheduler, &txid).await,
    }?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Order {} is {}", order.transaction_id, order.status))))
}

/// POST /orders/capture. The client-driven capture path; the auto-capture timer drives the same
/// engine call through the capture worker.
pub async fn capture_order<B, S, T, E>(
    body: web::Json<OrderActionRequest>,
    api: web::Data<OrderFlowApi<B>>,
    providers: web::Data<ProviderRegistry<S, T, E>>,
    scheduler: web::Data<CaptureScheduler>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderStore + 'static,
    S: PaymentProvider + 'static,
    T: PaymentProvider + 'static,
    E: PaymentProvider + 'static,
{
    let txid = body.into_inner().payment_id;
    let order = api.fetch_order(&txid).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Order {txid}")))?;
    // The obligation is being met right now; a later timer fire would be a pointless replay.
    scheduler.cancel(&txid);
    let merchant = config.merchant_context(&order.merchant_id);
    let order = match order.payment_method {
        PaymentMethod::Card => api.capture_order(&providers.square, &merchant, &txid).await,
        PaymentMethod::ApplePay => api.capture_order(&providers.stripe, &merchant, &txid).await,
        PaymentMethod::External => api.capture_order(&providers.external_pos, &merchant, &txid).await,
    }?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Order {} is {}", order.transaction_id, order.status))))
}
