use std::fmt::Debug;

use bp_common::{Money, Secret};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::{idempotency_key, refund_idempotency_key},
    db_types::{LineItem, OrderStatus, ProviderOrderId, TransactionId},
    traits::{
        Authorization, AuthorizeRequest, CaptureMode, DeclineReason, MerchantContext, PaymentProvider, ProviderError,
    },
};

pub const SQUARE_API_VERSION: &str = "2024-06-04";

#[derive(Clone, Debug)]
pub struct SquareConfig {
    /// e.g. `https://connect.squareup.com` or the sandbox host.
    pub api_base: String,
    pub access_token: Secret<String>,
    /// Default location new orders are attached to when the merchant context has none.
    pub location_id: Option<String>,
}

impl SquareConfig {
    pub fn new<S: Into<String>>(api_base: S, access_token: Secret<String>) -> Self {
        Self { api_base: api_base.into(), access_token, location_id: None }
    }

    pub fn with_location_id<S: Into<String>>(mut self, location_id: S) -> Self {
        self.location_id = Some(location_id.into());
        self
    }
}

/// Card payments go through Square. Square's `CreatePayment` call charges inline
/// (`autocomplete: true`), so this adapter reports [`CaptureMode::Immediate`] and its `capture`
/// path only exists to make replays and mixed-provider code uniform.
#[derive(Clone)]
pub struct SquareAdapter {
    config: SquareConfig,
    client: Client,
}

impl Debug for SquareAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquareAdapter").field("api_base", &self.config.api_base).finish()
    }
}

impl SquareAdapter {
    pub fn new(config: SquareConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(format!("Could not construct the http client. {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base)
    }

    fn bearer_token(&self, merchant: Option<&MerchantContext>) -> String {
        merchant
            .and_then(|m| m.access_token.as_ref())
            .unwrap_or(&self.config.access_token)
            .reveal()
            .clone()
    }

    async fn get_payment(&self, id: &TransactionId) -> Result<SquarePayment, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/v2/payments/{id}")))
            .bearer_auth(self.bearer_token(None))
            .header("Square-Version", SQUARE_API_VERSION)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let err = read_error(response).await;
            return Err(ProviderError::Rejected(err.summary()));
        }
        let body: PaymentResponse =
            response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid payment response. {e}")))?;
        Ok(body.payment)
    }
}

impl PaymentProvider for SquareAdapter {
    fn name(&self) -> &'static str {
        "square"
    }

    fn capture_mode(&self) -> CaptureMode {
        CaptureMode::Immediate
    }

    async fn authorize(&self, request: AuthorizeRequest) -> Result<Authorization, ProviderError> {
        let location_id = request.merchant.location_id.clone().or_else(|| self.config.location_id.clone());
        let body = CreatePaymentRequest {
            source_id: request.source_token.clone(),
            idempotency_key: idempotency_key(),
            amount_money: AmountMoney { amount: request.amount.value(), currency: request.currency.clone() },
            autocomplete: true,
            location_id,
            buyer_email_address: request.customer.as_ref().and_then(|c| c.email.clone()),
        };
        debug!("💳️ Creating Square payment of {} for merchant {}", request.amount, request.merchant.merchant_id);
        let response = self
            .client
            .post(self.url("/v2/payments"))
            .bearer_auth(self.bearer_token(Some(&request.merchant)))
            .header("Square-Version", SQUARE_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let err = read_error(response).await;
            warn!("💳️ Square rejected the payment: {}", err.summary());
            return Err(err.into_provider_error());
        }
        let body: PaymentResponse =
            response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid payment response. {e}")))?;
        let payment = body.payment;
        info!("💳️ Square payment [{}] created with status {:?}", payment.id, payment.status);
        Ok(Authorization {
            provider_transaction_id: TransactionId::from(payment.id),
            status: OrderStatus::Submitted,
            receipt_url: payment.receipt_url,
            receipt_number: payment.receipt_number,
        })
    }

    async fn create_merchant_order(
        &self,
        items: &[LineItem],
        merchant: &MerchantContext,
    ) -> Result<Option<ProviderOrderId>, ProviderError> {
        let Some(location_id) = merchant.location_id.clone().or_else(|| self.config.location_id.clone()) else {
            return Err(ProviderError::Rejected("No Square location is configured for this merchant".to_string()));
        };
        let line_items = items
            .iter()
            .map(|item| SquareLineItem {
                name: item.name.clone(),
                quantity: item.quantity.to_string(),
                base_price_money: AmountMoney { amount: item.unit_price.value(), currency: "USD".to_string() },
                note: item.note.clone(),
            })
            .collect();
        let body = CreateOrderRequest {
            idempotency_key: idempotency_key(),
            order: SquareOrderBody { location_id, line_items },
        };
        let response = self
            .client
            .post(self.url("/v2/orders"))
            .bearer_auth(self.bearer_token(Some(merchant)))
            .header("Square-Version", SQUARE_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let err = read_error(response).await;
            return Err(ProviderError::Rejected(err.summary()));
        }
        let body: OrderResponse =
            response.json().await.map_err(|e| ProviderError::Transport(format!("Invalid order response. {e}")))?;
        info!("🛍️️ Square order [{}] created for merchant {}", body.order.id, merchant.merchant_id);
        Ok(Some(ProviderOrderId::from(body.order.id)))
    }

    async fn capture(&self, provider_txid: &TransactionId) -> Result<Money, ProviderError> {
        let response = self
            .client
            .post(self.url(&format!("/v2/payments/{provider_txid}/complete")))
            .bearer_auth(self.bearer_token(None))
            .header("Square-Version", SQUARE_API_VERSION)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if response.status().is_success() {
            let body: PaymentResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::Transport(format!("Invalid payment response. {e}")))?;
            return Ok(body.payment.amount());
        }
        // A failed completion usually means the payment is already in a final state. Check before
        // surfacing an error so that replayed captures stay idempotent.
        let err = read_error(response).await;
        let payment = self.get_payment(provider_txid).await?;
        match payment.status.as_deref() {
            Some("COMPLETED") => {
                debug!("💳️ Square payment [{provider_txid}] was already captured");
                Ok(payment.amount())
            },
            _ => Err(ProviderError::CaptureFailed(err.summary())),
        }
    }

    async fn cancel_or_refund(&self, provider_txid: &TransactionId) -> Result<Option<String>, ProviderError> {
        let response = self
            .client
            .post(self.url(&format!("/v2/payments/{provider_txid}/cancel")))
            .bearer_auth(self.bearer_token(None))
            .header("Square-Version", SQUARE_API_VERSION)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if response.status().is_success() {
            info!("💳️ Square payment [{provider_txid}] voided");
            return Ok(None);
        }
        let err = read_error(response).await;
        // The hold may already be gone, or the payment may have been captured, in which case the
        // money has to come back as a refund.
        let payment = self.get_payment(provider_txid).await?;
        match payment.status.as_deref() {
            Some("CANCELED") | Some("FAILED") => {
                debug!("💳️ Square payment [{provider_txid}] was already cancelled");
                Ok(None)
            },
            Some("COMPLETED") => {
                let body = RefundRequest {
                    idempotency_key: refund_idempotency_key(provider_txid),
                    payment_id: provider_txid.to_string(),
                    amount_money: AmountMoney {
                        amount: payment.amount().value(),
                        currency: payment.currency().to_string(),
                    },
                };
                let response = self
                    .client
                    .post(self.url("/v2/refunds"))
                    .bearer_auth(self.bearer_token(None))
                    .header("Square-Version", SQUARE_API_VERSION)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| ProviderError::Transport(e.to_string()))?;
                if !response.status().is_success() {
                    let err = read_error(response).await;
                    return Err(ProviderError::Rejected(err.summary()));
                }
                let body: RefundResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Transport(format!("Invalid refund response. {e}")))?;
                info!("💳️ Square payment [{provider_txid}] refunded. Refund id is {}", body.refund.id);
                Ok(Some(body.refund.id))
            },
            _ => Err(ProviderError::Rejected(err.summary())),
        }
    }

    fn post_capture_status(&self) -> OrderStatus {
        OrderStatus::Submitted
    }
}

//--------------------------------------    Wire objects    ----------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct AmountMoney {
    amount: i64,
    currency: String,
}

#[derive(Debug, Serialize)]
struct CreatePaymentRequest {
    source_id: String,
    idempotency_key: String,
    amount_money: AmountMoney,
    autocomplete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    payment: SquarePayment,
}

#[derive(Debug, Deserialize)]
struct SquarePayment {
    id: String,
    status: Option<String>,
    receipt_url: Option<String>,
    receipt_number: Option<String>,
    amount_money: Option<AmountMoney>,
}

impl SquarePayment {
    fn amount(&self) -> Money {
        Money::from(self.amount_money.as_ref().map(|m| m.amount).unwrap_or_default())
    }

    fn currency(&self) -> &str {
        self.amount_money.as_ref().map(|m| m.currency.as_str()).unwrap_or("USD")
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    idempotency_key: String,
    order: SquareOrderBody,
}

#[derive(Debug, Serialize)]
struct SquareOrderBody {
    location_id: String,
    line_items: Vec<SquareLineItem>,
}

#[derive(Debug, Serialize)]
struct SquareLineItem {
    name: String,
    quantity: String,
    base_price_money: AmountMoney,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order: SquareOrderInfo,
}

#[derive(Debug, Deserialize)]
struct SquareOrderInfo {
    id: String,
}

#[derive(Debug, Serialize)]
struct RefundRequest {
    idempotency_key: String,
    payment_id: String,
    amount_money: AmountMoney,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    refund: SquareRefund,
}

#[derive(Debug, Deserialize)]
struct SquareRefund {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct SquareErrorResponse {
    #[serde(default)]
    errors: Vec<SquareError>,
}

#[derive(Debug, Deserialize)]
struct SquareError {
    code: Option<String>,
    detail: Option<String>,
}

struct ApiError {
    status: StatusCode,
    errors: Vec<SquareError>,
}

impl ApiError {
    fn summary(&self) -> String {
        let codes: Vec<&str> =
            self.errors.iter().filter_map(|e| e.code.as_deref()).collect();
        format!("Square returned {} ({})", self.status, codes.join(", "))
    }

    fn into_provider_error(self) -> ProviderError {
        for err in &self.errors {
            if let Some(reason) = err.code.as_deref().and_then(decline_reason_for_code) {
                return ProviderError::Declined(reason);
            }
        }
        ProviderError::Rejected(self.summary())
    }
}

/// The raw provider detail is logged here; only the code and status cross the adapter boundary.
async fn read_error(response: reqwest::Response) -> ApiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: SquareErrorResponse = serde_json::from_str(&body).unwrap_or_default();
    for err in &parsed.errors {
        warn!("💳️ Square error {:?}: {}", err.code, err.detail.as_deref().unwrap_or("(no detail)"));
    }
    ApiError { status, errors: parsed.errors }
}

fn decline_reason_for_code(code: &str) -> Option<DeclineReason> {
    let reason = match code {
        "CARD_DECLINED" => DeclineReason::CardDeclined,
        "GENERIC_DECLINE" => DeclineReason::CardDeclined,
        "INSUFFICIENT_FUNDS" => DeclineReason::InsufficientFunds,
        "CVV_FAILURE" => DeclineReason::CvvFailure,
        "ADDRESS_VERIFICATION_FAILURE" => DeclineReason::AvsFailure,
        "CARD_EXPIRED" | "EXPIRATION_FAILURE" => DeclineReason::CardExpired,
        "PAYMENT_LIMIT_EXCEEDED" | "CARD_NOT_SUPPORTED" => DeclineReason::Generic,
        _ => return None,
    };
    Some(reason)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn square_decline_codes_map_to_sanitized_reasons() {
        assert_eq!(decline_reason_for_code("CARD_DECLINED"), Some(DeclineReason::CardDeclined));
        assert_eq!(decline_reason_for_code("INSUFFICIENT_FUNDS"), Some(DeclineReason::InsufficientFunds));
        assert_eq!(decline_reason_for_code("CVV_FAILURE"), Some(DeclineReason::CvvFailure));
        assert_eq!(decline_reason_for_code("ADDRESS_VERIFICATION_FAILURE"), Some(DeclineReason::AvsFailure));
        assert_eq!(decline_reason_for_code("CARD_EXPIRED"), Some(DeclineReason::CardExpired));
        // Non-decline codes fall through so they surface as rejections, not declines.
        assert_eq!(decline_reason_for_code("UNAUTHORIZED"), None);
    }

    #[test]
    fn idempotency_keys_are_unique_and_short() {
        let a = idempotency_key();
        let b = idempotency_key();
        assert_ne!(a, b);
        assert!(a.len() <= 45);
    }

    #[test]
    fn refund_keys_are_stable_per_payment() {
        let txid = TransactionId::from("bPHgTQ2zRYMpLkF6sC8dJwXe1NvfUVaZY");
        // A replayed cancel must present the same key, or the provider mints a second refund.
        assert_eq!(refund_idempotency_key(&txid), refund_idempotency_key(&txid));
        assert_ne!(refund_idempotency_key(&txid), refund_idempotency_key(&TransactionId::from("other")));
        assert!(refund_idempotency_key(&txid).len() <= 45);
    }
}
