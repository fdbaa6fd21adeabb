//! The "order ready" push notification sink.
//!
//! Strictly best-effort: the reconciliation engine publishes an event after the status write has
//! committed, and everything that goes wrong here is swallowed and logged. A failed push must
//! never undo, block, or fail an order write.

use beanpay_engine::{db_types::Order, events::OrderReadyEvent};
use log::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::PushConfig;

#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("The device directory could not be reached. {0}")]
    DirectoryUnavailable(String),
    #[error("The push gateway rejected the dispatch. {0}")]
    DispatchFailed(String),
}

/// Resolves a customer's registered device tokens. The production implementation calls the device
/// directory service; tests substitute a canned one.
#[allow(async_fn_in_trait)]
pub trait DeviceDirectory {
    async fn device_tokens(&self, customer_email: &str) -> Result<Vec<String>, NotifyError>;
}

#[derive(Clone)]
pub struct HttpDeviceDirectory {
    base_url: String,
    client: Client,
}

impl HttpDeviceDirectory {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self { base_url: base_url.into(), client: Client::new() }
    }
}

#[derive(Deserialize)]
struct DeviceTokensResponse {
    #[serde(default)]
    tokens: Vec<String>,
}

impl DeviceDirectory for HttpDeviceDirectory {
    async fn device_tokens(&self, customer_email: &str) -> Result<Vec<String>, NotifyError> {
        let response = self
            .client
            .get(format!("{}/devices", self.base_url))
            .query(&[("email", customer_email)])
            .send()
            .await
            .map_err(|e| NotifyError::DirectoryUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::DirectoryUnavailable(format!("status {}", response.status())));
        }
        let body: DeviceTokensResponse =
            response.json().await.map_err(|e| NotifyError::DirectoryUnavailable(e.to_string()))?;
        Ok(body.tokens)
    }
}

/// Fixed title/body template plus the metadata the client uses for deep-linking.
pub fn build_push_payload(token: &str, order: &Order, shop_name: &str) -> serde_json::Value {
    json!({
        "to": token,
        "title": "Order ready! ☕️",
        "body": format!("Your order at {shop_name} is ready for pickup."),
        "data": {
            "order_id": order.transaction_id,
            "status": order.status,
            "shop_name": shop_name,
        }
    })
}

pub struct PushGateway<D> {
    config: PushConfig,
    directory: D,
    client: Client,
}

impl<D: DeviceDirectory> PushGateway<D> {
    pub fn new(config: PushConfig, directory: D) -> Self {
        Self { config, directory, client: Client::new() }
    }

    /// Dispatch an "order ready" push to every device the customer has registered. Failures are
    /// logged and swallowed.
    pub async fn notify_order_ready(&self, event: &OrderReadyEvent) {
        let order = &event.order;
        let Some(email) = order.customer.as_ref().and_then(|c| c.email.as_deref()) else {
            debug!("📣️🔔️ Order [{}] has no customer email. No push sent.", order.transaction_id);
            return;
        };
        if self.config.gateway_url.is_empty() {
            debug!("📣️🔔️ No push gateway is configured. No push sent.");
            return;
        }
        let tokens = match self.directory.device_tokens(email).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("📣️🔔️ Could not resolve devices for order [{}]: {e}", order.transaction_id);
                return;
            },
        };
        if tokens.is_empty() {
            debug!("📣️🔔️ No registered devices for order [{}]. No push sent.", order.transaction_id);
            return;
        }
        let shop_name = self.config.shop_name.as_str();
        for token in &tokens {
            if let Err(e) = self.dispatch(token, order, shop_name).await {
                warn!("📣️🔔️ Push for order [{}] failed: {e}", order.transaction_id);
            }
        }
        info!("📣️🔔️ Order [{}] is ready; notified {} device(s)", order.transaction_id, tokens.len());
    }

    async fn dispatch(&self, token: &str, order: &Order, shop_name: &str) -> Result<(), NotifyError> {
        let payload = build_push_payload(token, order, shop_name);
        let response = self
            .client
            .post(&self.config.gateway_url)
            .bearer_auth(self.config.api_key.reveal())
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::DispatchFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::DispatchFailed(format!("status {}", response.status())));
        }
        Ok(())
    }
}
