//! The capture worker: services the auto-capture timer channel.
//!
//! The scheduler only decides *when* a capture is due; this worker owns the actual provider call.
//! It runs on its own task for the life of the server, draining transaction ids off the trigger
//! channel and driving the engine's capture flow for each. Failures are logged and left for a
//! retry (client-driven, or a replayed timer); the worker never dies over a single bad capture.

use beanpay_engine::{
    adapters::{ExternalPosAdapter, SquareAdapter, StripeAdapter},
    db_types::{PaymentMethod, TransactionId},
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;
use tokio::sync::mpsc;

use crate::{config::ServerConfig, routes::ProviderRegistry};

pub fn start_capture_worker(
    api: OrderFlowApi<SqliteDatabase>,
    providers: ProviderRegistry<SquareAdapter, StripeAdapter, ExternalPosAdapter>,
    config: ServerConfig,
    mut trigger: mpsc::Receiver<TransactionId>,
) {
    tokio::spawn(async move {
        info!("⏲️ Capture worker started");
        while let Some(txid) = trigger.recv().await {
            debug!("⏲️ Auto-capture due for [{txid}]");
            let order = match api.fetch_order(&txid).await {
                Ok(Some(order)) => order,
                Ok(None) => {
                    warn!("⏲️ Auto-capture fired for [{txid}], but no such order exists. Skipping.");
                    continue;
                },
                Err(e) => {
                    error!("⏲️ Could not load order [{txid}] for auto-capture: {e}");
                    continue;
                },
            };
            let merchant = config.merchant_context(&order.merchant_id);
            let result = match order.payment_method {
                PaymentMethod::Card => api.capture_order(&providers.square, &merchant, &txid).await,
                PaymentMethod::ApplePay => api.capture_order(&providers.stripe, &merchant, &txid).await,
                PaymentMethod::External => api.capture_order(&providers.external_pos, &merchant, &txid).await,
            };
            match result {
                Ok(order) => info!("⏲️ Auto-capture for [{txid}] done. Order is {}", order.status),
                Err(e) => error!("⏲️ Auto-capture for [{txid}] failed: {e}. The capture may be retried."),
            }
        }
        info!("⏲️ Capture worker has shut down");
    });
}
