use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use beanpay_engine::{
    adapters::{ExternalPosAdapter, SquareAdapter, StripeAdapter},
    events::{EventHandlers, EventHooks, EventProducers},
    traits::{OrderStore, PaymentProvider},
    CaptureScheduler,
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    capture_worker::start_capture_worker,
    config::ServerConfig,
    errors::ServerError,
    middleware::HmacMiddlewareFactory,
    notify::{HttpDeviceDirectory, PushGateway},
    routes::{cancel_order, capture_order, health, merchant_credentials, place_order, ProviderRegistry},
    webhook::order_webhook,
};

/// The signature header checked on every webhook delivery.
pub const WEBHOOK_HMAC_HEADER: &str = "x-beanpay-hmac-sha256";

const EVENT_BUFFER_SIZE: usize = 50;
const CAPTURE_CHANNEL_SIZE: usize = 100;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let square = SquareAdapter::new(config.square.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let stripe = StripeAdapter::new(config.stripe.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let external_pos =
        ExternalPosAdapter::new(config.external_pos.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let (scheduler, capture_trigger) = CaptureScheduler::with_channel(CAPTURE_CHANNEL_SIZE);
    let producers = start_event_handlers(&config).await;

    let worker_api = OrderFlowApi::new(db.clone(), producers.clone());
    let worker_providers = ProviderRegistry::new(square.clone(), stripe.clone(), external_pos.clone());
    start_capture_worker(worker_api, worker_providers, config.clone(), capture_trigger);

    let providers = ProviderRegistry::new(square, stripe, external_pos);
    let srv = create_server_instance(config, db, producers, providers, scheduler)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Wire up the engine's lifecycle hooks: the push gateway listens for "order ready", and
/// annulments are logged for the audit trail.
async fn start_event_handlers(config: &ServerConfig) -> EventProducers {
    let push = Arc::new(PushGateway::new(
        config.push.clone(),
        HttpDeviceDirectory::new(config.push.device_directory_url.clone()),
    ));
    let mut hooks = EventHooks::default();
    hooks.on_order_ready(move |event| {
        let push = Arc::clone(&push);
        Box::pin(async move {
            push.notify_order_ready(&event).await;
        })
    });
    hooks.on_order_annulled(|event| {
        Box::pin(async move {
            info!(
                "📣️ Order [{}] was annulled (was {})",
                event.order.transaction_id, event.previous_status
            );
        })
    });
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance<B, S, T, E>(
    config: ServerConfig,
    db: B,
    producers: EventProducers,
    providers: ProviderRegistry<S, T, E>,
    scheduler: CaptureScheduler,
) -> Result<Server, ServerError>
where
    B: OrderStore + Clone + Send + 'static,
    S: PaymentProvider + Send + Sync + 'static,
    T: PaymentProvider + Send + Sync + 'static,
    E: PaymentProvider + Send + Sync + 'static,
{
    let host = config.host.clone();
    let port = config.port;
    info!("🛍️️ Starting BeanPay server on {host}:{port}");
    let providers = web::Data::new(providers);
    let srv = HttpServer::new(move || {
        let api = OrderFlowApi::new(db.clone(), producers.clone());
        let hmac = HmacMiddlewareFactory::new(
            WEBHOOK_HMAC_HEADER,
            config.webhook.hmac_secret.clone(),
            config.webhook.hmac_checks,
        );
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("bp::access_log"))
            .app_data(web::Data::new(api))
            .app_data(providers.clone())
            .app_data(web::Data::new(scheduler.clone()))
            .app_data(web::Data::new(config.clone()))
            .service(health)
            .route("/merchants/{merchant_id}/credentials", web::get().to(merchant_credentials))
            .route("/orders", web::post().to(place_order::<B, S, T, E>))
            .route("/orders/cancel", web::post().to(cancel_order::<B, S, T, E>))
            .route("/orders/capture", web::post().to(capture_order::<B, S, T, E>))
            .service(web::scope("/webhook").wrap(hmac).route("/orders", web::post().to(order_webhook::<B>)))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
