use beanpay_engine::db_types::{Customer, LineItem, OrderStatus, PaymentMethod, ProviderOrderId, TransactionId};
use bp_common::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// The place-order request body. The payment token field goes by a different name in each client
/// SDK, so several aliases are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(alias = "nonce", alias = "token_id", alias = "tokenId")]
    pub source_token: String,
    /// Minor currency units.
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub merchant_id: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderResponse {
    pub success: bool,
    pub transaction_id: TransactionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<ProviderOrderId>,
    pub status: OrderStatus,
    pub amount: Money,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderActionRequest {
    #[serde(alias = "paymentId", alias = "transaction_id")]
    pub payment_id: TransactionId,
}

/// The client-side credential bundle for a merchant. Secrets never appear here.
#[derive(Debug, Clone, Serialize)]
pub struct MerchantCredentialsResponse {
    pub merchant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    pub environment: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn place_order_request_accepts_token_aliases() {
        for field in ["source_token", "nonce", "token_id", "tokenId"] {
            let raw = format!(
                r#"{{"{field}": "tok_1", "amount": 450, "merchant_id": "m1", "payment_method": "card"}}"#
            );
            let req: PlaceOrderRequest = serde_json::from_str(&raw).unwrap();
            assert_eq!(req.source_token, "tok_1", "alias {field} not accepted");
            assert_eq!(req.amount, 450);
        }
    }

    #[test]
    fn action_request_accepts_payment_id_aliases() {
        let req: OrderActionRequest = serde_json::from_str(r#"{"paymentId": "T1"}"#).unwrap();
        assert_eq!(req.payment_id, TransactionId::from("T1"));
        let req: OrderActionRequest = serde_json::from_str(r#"{"payment_id": "T2"}"#).unwrap();
        assert_eq!(req.payment_id, TransactionId::from("T2"));
    }
}
