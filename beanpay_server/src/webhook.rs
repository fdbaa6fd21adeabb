//! Webhook ingress: envelope parsing and vendor-vocabulary normalization.
//!
//! The order channel delivers three event types: `order.created` (log only; order records are
//! created by the payment handler, never by webhook), `order.updated` (order-level state), and
//! `order.fulfillment.updated` (fulfillment-level state list). Everything the ingress cannot use
//! is logged and acknowledged with a 200 so the provider does not retry conditions that will
//! never resolve. Signature verification happens before this module, in the HMAC middleware.

use actix_web::{web, HttpResponse};
use beanpay_engine::{
    db_types::ProviderOrderId,
    traits::{map_vendor_fulfillment_state, map_vendor_order_state, OrderStore},
    NormalizedEvent, OrderFlowApi, ReconcileOutcome,
};
use log::*;
use serde::Deserialize;

use crate::data_objects::JsonResponse;

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_UPDATED: &str = "order.updated";
pub const FULFILLMENT_UPDATED: &str = "order.fulfillment.updated";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: WebhookObject,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookObject {
    #[serde(default)]
    pub order_created: Option<OrderCreated>,
    #[serde(default)]
    pub order_updated: Option<OrderUpdated>,
    #[serde(default)]
    pub fulfillment_updated: Option<FulfillmentUpdated>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdated {
    pub order_id: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentUpdated {
    pub order_id: String,
    #[serde(default)]
    pub fulfillment_update: Vec<FulfillmentUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentUpdate {
    #[serde(default)]
    pub old_state: Option<String>,
    #[serde(default)]
    pub new_state: Option<String>,
}

/// Extract the normalized (order id, internal status) pair from an event envelope. `None` means
/// the event carries no state change we act on.
pub fn normalize(event: &WebhookEvent) -> Option<NormalizedEvent> {
    match event.event_type.as_str() {
        ORDER_CREATED => {
            if let Some(created) = &event.data.object.order_created {
                info!("🛎️ Provider order {} was created upstream. No state effect.", created.order_id);
            }
            None
        },
        ORDER_UPDATED => {
            let updated = event.data.object.order_updated.as_ref()?;
            let state = updated.state.as_deref()?;
            Some(NormalizedEvent {
                provider_order_id: ProviderOrderId::from(updated.order_id.clone()),
                incoming_status: map_vendor_order_state(state),
            })
        },
        FULFILLMENT_UPDATED => {
            let updated = event.data.object.fulfillment_updated.as_ref()?;
            // The update list describes a sequence of transitions; the last new_state is where the
            // fulfillment landed.
            let state = updated.fulfillment_update.iter().rev().find_map(|u| u.new_state.as_deref())?;
            Some(NormalizedEvent {
                provider_order_id: ProviderOrderId::from(updated.order_id.clone()),
                incoming_status: map_vendor_fulfillment_state(state),
            })
        },
        other => {
            info!("🛎️ Ignoring unrecognized webhook event type: {other}");
            None
        },
    }
}

/// POST /webhook/orders. Always answers 2xx for handled or intentionally ignored events; only an
/// unexpected backend failure yields a 5xx (and the provider may retry that one).
pub async fn order_webhook<B: OrderStore + 'static>(
    event: web::Json<WebhookEvent>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let event = event.into_inner();
    debug!("🛎️ Webhook event received: {}", event.event_type);
    let Some(normalized) = normalize(&event) else {
        return HttpResponse::Ok().json(JsonResponse::success("Event ignored"));
    };
    match api.process_provider_event(normalized).await {
        Ok(ReconcileOutcome::Applied { order, previous }) => {
            debug!("🛎️ Order [{}] reconciled: {previous} -> {}", order.transaction_id, order.status);
            HttpResponse::Ok().json(JsonResponse::success(format!("Order is now {}", order.status)))
        },
        Ok(ReconcileOutcome::NoOp { order }) => {
            HttpResponse::Ok().json(JsonResponse::success(format!("Order remains {}", order.status)))
        },
        Ok(ReconcileOutcome::UnknownOrder(oid)) => {
            HttpResponse::Ok().json(JsonResponse::success(format!("No order for {oid}")))
        },
        Err(e) => {
            error!("🛎️ Webhook reconciliation failed: {e}");
            HttpResponse::InternalServerError().json(JsonResponse::failure("Internal error"))
        },
    }
}
