use std::fmt::Debug;

use bp_common::{Money, Secret};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    adapters::refund_idempotency_key,
    db_types::{LineItem, OrderStatus, ProviderOrderId, TransactionId},
    traits::{
        Authorization, AuthorizeRequest, CaptureMode, DeclineReason, MerchantContext, PaymentProvider, ProviderError,
    },
};

#[derive(Clone, Debug)]
pub struct StripeConfig {
    /// e.g. `https://api.stripe.com`.
    pub api_base: String,
    pub secret_key: Secret<String>,
}

impl StripeConfig {
    pub fn new<S: Into<String>>(api_base: S, secret_key: Secret<String>) -> Self {
        Self { api_base: api_base.into(), secret_key }
    }
}

/// Apple Pay payments are tokenized through Stripe. The payment intent is created with
/// `capture_method=manual`, so authorization only places a hold and the charge is finalized by a
/// later capture (user pickup or the auto-capture timer).
#[derive(Clone)]
pub struct StripeAdapter {
    config: StripeConfig,
    client: Client,
}

impl Debug for StripeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeAdapter").field("api_base", &self.config.api_base).finish()
    }
}

impl StripeAdapter {
    pub fn new(config: StripeConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(format!("Could not construct the http client. {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base)
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<reqwest::Response, ProviderError> {
        self.client
            .post(self.url(path))
            .basic_auth(self.config.secret_key.reveal(), None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }

    async fn get_intent(&self, id: &TransactionId) -> Result<PaymentIntent, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{id}")))
            .basic_auth(self.config.secret_key.reveal(), None::<&str>)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let err = read_error(response).await;
            return Err(ProviderError::Rejected(err.summary()));
        }
        response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid intent response. {e}")))
    }
}

impl PaymentProvider for StripeAdapter {
    fn name(&self) -> &'static str {
        "stripe"
    }

    fn capture_mode(&self) -> CaptureMode {
        CaptureMode::Deferred
    }

    async fn authorize(&self, request: AuthorizeRequest) -> Result<Authorization, ProviderError> {
        let mut form = vec![
            ("amount", request.amount.value().to_string()),
            ("currency", request.currency.to_lowercase()),
            ("payment_method", request.source_token.clone()),
            ("confirm", "true".to_string()),
            ("capture_method", "manual".to_string()),
        ];
        if let Some(email) = request.customer.as_ref().and_then(|c| c.email.clone()) {
            form.push(("receipt_email", email));
        }
        debug!("💳️ Creating Stripe payment intent of {} for merchant {}", request.amount, request.merchant.merchant_id);
        let response = self.post_form("/v1/payment_intents", &form).await?;
        if !response.status().is_success() {
            let err = read_error(response).await;
            warn!("💳️ Stripe rejected the payment: {}", err.summary());
            return Err(err.into_provider_error());
        }
        let intent: PaymentIntent =
            response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid intent response. {e}")))?;
        info!("💳️ Stripe payment intent [{}] created with status {:?}", intent.id, intent.status);
        Ok(Authorization {
            provider_transaction_id: TransactionId::from(intent.id),
            status: OrderStatus::Authorized,
            receipt_url: None,
            receipt_number: None,
        })
    }

    /// Stripe has no merchant-order object. The merchant order is created downstream, at capture
    /// time, by the POS integration.
    async fn create_merchant_order(
        &self,
        _items: &[LineItem],
        _merchant: &MerchantContext,
    ) -> Result<Option<ProviderOrderId>, ProviderError> {
        Ok(None)
    }

    async fn capture(&self, provider_txid: &TransactionId) -> Result<Money, ProviderError> {
        let response = self.post_form(&format!("/v1/payment_intents/{provider_txid}/capture"), &[]).await?;
        if response.status().is_success() {
            let intent: PaymentIntent =
                response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid intent response. {e}")))?;
            info!("💳️ Stripe payment intent [{provider_txid}] captured");
            return Ok(Money::from(intent.amount_received.unwrap_or_default()));
        }
        let err = read_error(response).await;
        // `capture` on a succeeded intent returns an unexpected-state error. Treat that replay as
        // success so the capture path stays idempotent.
        let intent = self.get_intent(provider_txid).await?;
        match intent.status.as_deref() {
            Some("succeeded") => {
                debug!("💳️ Stripe payment intent [{provider_txid}] was already captured");
                Ok(Money::from(intent.amount_received.unwrap_or_default()))
            },
            _ => Err(ProviderError::CaptureFailed(err.summary())),
        }
    }

    async fn cancel_or_refund(&self, provider_txid: &TransactionId) -> Result<Option<String>, ProviderError> {
        let response = self.post_form(&format!("/v1/payment_intents/{provider_txid}/cancel"), &[]).await?;
        if response.status().is_success() {
            info!("💳️ Stripe payment intent [{provider_txid}] cancelled");
            return Ok(None);
        }
        let err = read_error(response).await;
        let intent = self.get_intent(provider_txid).await?;
        match intent.status.as_deref() {
            Some("canceled") => {
                debug!("💳️ Stripe payment intent [{provider_txid}] was already cancelled");
                Ok(None)
            },
            // A captured intent can no longer be voided. Refund it instead. The key is stable per
            // payment, so Stripe replays the original refund rather than creating a second one.
            Some("succeeded") => {
                let form = [("payment_intent", provider_txid.to_string())];
                let response = self
                    .client
                    .post(self.url("/v1/refunds"))
                    .basic_auth(self.config.secret_key.reveal(), None::<&str>)
                    .header("Idempotency-Key", refund_idempotency_key(provider_txid))
                    .form(&form)
                    .send()
                    .await
                    .map_err(|e| ProviderError::Transport(e.to_string()))?;
                if !response.status().is_success() {
                    let err = read_error(response).await;
                    if already_refunded(err.body.code.as_deref()) {
                        debug!("💳️ Stripe payment intent [{provider_txid}] was already refunded");
                        return Ok(None);
                    }
                    return Err(ProviderError::Rejected(err.summary()));
                }
                let refund: Refund =
                    response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid refund response. {e}")))?;
                info!("💳️ Stripe payment intent [{provider_txid}] refunded. Refund id is {}", refund.id);
                Ok(Some(refund.id))
            },
            _ => Err(ProviderError::Rejected(err.summary())),
        }
    }

    fn post_capture_status(&self) -> OrderStatus {
        OrderStatus::Submitted
    }

    /// Stripe order-level events speak in intent statuses rather than the vendor order table.
    fn map_order_state(&self, state: &str) -> OrderStatus {
        match state {
            "requires_capture" => OrderStatus::Authorized,
            "processing" => OrderStatus::Submitted,
            "succeeded" => OrderStatus::Completed,
            "canceled" => OrderStatus::Cancelled,
            _ => OrderStatus::Submitted,
        }
    }
}

//--------------------------------------    Wire objects    ----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: Option<String>,
    amount_received: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorResponse {
    #[serde(default)]
    error: StripeErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorBody {
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
}

struct ApiError {
    status: StatusCode,
    body: StripeErrorBody,
}

impl ApiError {
    fn summary(&self) -> String {
        format!("Stripe returned {} ({})", self.status, self.body.code.as_deref().unwrap_or("no code"))
    }

    fn into_provider_error(self) -> ProviderError {
        match decline_reason(self.body.code.as_deref(), self.body.decline_code.as_deref()) {
            Some(reason) => ProviderError::Declined(reason),
            None => ProviderError::Rejected(self.summary()),
        }
    }
}

async fn read_error(response: reqwest::Response) -> ApiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: StripeErrorResponse = serde_json::from_str(&body).unwrap_or_default();
    warn!(
        "💳️ Stripe error {:?}/{:?}: {}",
        parsed.error.code,
        parsed.error.decline_code,
        parsed.error.message.as_deref().unwrap_or("(no message)")
    );
    ApiError { status, body: parsed.error }
}

/// The refund already went through on a previous delivery of the same cancel.
fn already_refunded(code: Option<&str>) -> bool {
    matches!(code, Some("charge_already_refunded"))
}

fn decline_reason(code: Option<&str>, decline_code: Option<&str>) -> Option<DeclineReason> {
    let reason = match code? {
        "card_declined" => match decline_code.unwrap_or("generic_decline") {
            "insufficient_funds" => DeclineReason::InsufficientFunds,
            "expired_card" => DeclineReason::CardExpired,
            "incorrect_cvc" => DeclineReason::CvvFailure,
            _ => DeclineReason::CardDeclined,
        },
        "expired_card" => DeclineReason::CardExpired,
        "incorrect_cvc" => DeclineReason::CvvFailure,
        "incorrect_address" | "incorrect_zip" => DeclineReason::AvsFailure,
        "processing_error" => DeclineReason::Generic,
        _ => return None,
    };
    Some(reason)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stripe_decline_codes_map_to_sanitized_reasons() {
        assert_eq!(decline_reason(Some("card_declined"), None), Some(DeclineReason::CardDeclined));
        assert_eq!(
            decline_reason(Some("card_declined"), Some("insufficient_funds")),
            Some(DeclineReason::InsufficientFunds)
        );
        assert_eq!(decline_reason(Some("expired_card"), None), Some(DeclineReason::CardExpired));
        assert_eq!(decline_reason(Some("incorrect_cvc"), None), Some(DeclineReason::CvvFailure));
        assert_eq!(decline_reason(Some("incorrect_zip"), None), Some(DeclineReason::AvsFailure));
        assert_eq!(decline_reason(Some("rate_limit"), None), None);
        assert_eq!(decline_reason(None, Some("insufficient_funds")), None);
    }

    #[test]
    fn a_replayed_refund_counts_as_settled() {
        assert!(already_refunded(Some("charge_already_refunded")));
        assert!(!already_refunded(Some("rate_limit")));
        assert!(!already_refunded(None));
    }

    #[test]
    fn intent_statuses_map_through_the_order_table() {
        let adapter = StripeAdapter::new(StripeConfig::new("https://api.stripe.com", Secret::default())).unwrap();
        assert_eq!(adapter.map_order_state("requires_capture"), OrderStatus::Authorized);
        assert_eq!(adapter.map_order_state("succeeded"), OrderStatus::Completed);
        assert_eq!(adapter.map_order_state("canceled"), OrderStatus::Cancelled);
        assert_eq!(adapter.map_order_state("who_knows"), OrderStatus::Submitted);
    }
}
