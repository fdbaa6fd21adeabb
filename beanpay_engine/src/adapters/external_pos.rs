use std::fmt::Debug;

use bp_common::{Money, Secret};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    adapters::idempotency_key,
    db_types::{LineItem, OrderStatus, ProviderOrderId, TransactionId},
    traits::{Authorization, AuthorizeRequest, CaptureMode, MerchantContext, PaymentProvider, ProviderError},
};

#[derive(Clone, Debug)]
pub struct ExternalPosConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
}

impl ExternalPosConfig {
    pub fn new<S: Into<String>>(base_url: S, api_key: Secret<String>) -> Self {
        Self { base_url: base_url.into(), api_key }
    }
}

/// Adapter for merchants running their own point-of-sale bridge. The bridge exposes a small JSON
/// API (authorize / capture / void) and forwards status changes back through the ordinary webhook
/// channel, so from the engine's point of view it behaves like any other deferred-capture
/// provider.
#[derive(Clone)]
pub struct ExternalPosAdapter {
    config: ExternalPosConfig,
    client: Client,
}

impl Debug for ExternalPosAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalPosAdapter").field("base_url", &self.config.base_url).finish()
    }
}

impl ExternalPosAdapter {
    pub fn new(config: ExternalPosConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(format!("Could not construct the http client. {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response, ProviderError> {
        self.client
            .post(self.url(path))
            .bearer_auth(self.config.api_key.reveal())
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

impl PaymentProvider for ExternalPosAdapter {
    fn name(&self) -> &'static str {
        "external_pos"
    }

    fn capture_mode(&self) -> CaptureMode {
        CaptureMode::Deferred
    }

    async fn authorize(&self, request: AuthorizeRequest) -> Result<Authorization, ProviderError> {
        let body = PosAuthorizeRequest {
            token: request.source_token.clone(),
            amount: request.amount.value(),
            currency: request.currency.clone(),
            merchant_id: request.merchant.merchant_id.clone(),
            idempotency_key: idempotency_key(),
        };
        debug!("💳️ Authorizing POS payment of {} for merchant {}", request.amount, request.merchant.merchant_id);
        let response = self.post("/payments", &body).await?;
        if !response.status().is_success() {
            return Err(read_error(response).await);
        }
        let body: PosPaymentResponse =
            response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid POS response. {e}")))?;
        info!("💳️ POS payment [{}] authorized", body.transaction_id);
        Ok(Authorization {
            provider_transaction_id: TransactionId::from(body.transaction_id),
            status: OrderStatus::Authorized,
            receipt_url: body.receipt_url,
            receipt_number: body.receipt_number,
        })
    }

    /// The POS bridge opens its own ticket during authorization and reports the id back on the
    /// payment response, so there is no separate order call.
    async fn create_merchant_order(
        &self,
        _items: &[LineItem],
        _merchant: &MerchantContext,
    ) -> Result<Option<ProviderOrderId>, ProviderError> {
        Ok(None)
    }

    async fn capture(&self, provider_txid: &TransactionId) -> Result<Money, ProviderError> {
        let response = self.post(&format!("/payments/{provider_txid}/capture"), &serde_json::json!({})).await?;
        if !response.status().is_success() {
            let status = response.status();
            let _ = read_error(response).await;
            return Err(ProviderError::CaptureFailed(format!("The POS bridge returned {status}")));
        }
        let body: PosCaptureResponse =
            response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid POS response. {e}")))?;
        info!("💳️ POS payment [{provider_txid}] captured");
        Ok(Money::from(body.amount))
    }

    async fn cancel_or_refund(&self, provider_txid: &TransactionId) -> Result<Option<String>, ProviderError> {
        let response = self.post(&format!("/payments/{provider_txid}/void"), &serde_json::json!({})).await?;
        if !response.status().is_success() {
            return Err(read_error(response).await);
        }
        let body: PosVoidResponse =
            response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid POS response. {e}")))?;
        info!("💳️ POS payment [{provider_txid}] voided");
        Ok(body.refund_id)
    }
}

//--------------------------------------    Wire objects    ----------------------------------------------------------

#[derive(Debug, Serialize)]
struct PosAuthorizeRequest {
    token: String,
    amount: i64,
    currency: String,
    merchant_id: String,
    idempotency_key: String,
}

#[derive(Debug, Deserialize)]
struct PosPaymentResponse {
    transaction_id: String,
    #[serde(default)]
    receipt_url: Option<String>,
    #[serde(default)]
    receipt_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PosCaptureResponse {
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct PosVoidResponse {
    #[serde(default)]
    refund_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PosError {
    #[serde(default)]
    message: Option<String>,
}

async fn read_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<PosError>(&body).ok().and_then(|e| e.message);
    warn!("💳️ POS bridge error {status}: {}", message.as_deref().unwrap_or("(no detail)"));
    ProviderError::Rejected(format!("The POS bridge returned {status}"))
}
