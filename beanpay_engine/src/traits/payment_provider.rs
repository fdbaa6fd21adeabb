use std::fmt::Display;

use bp_common::{Money, Secret};
use thiserror::Error;

use crate::db_types::{Customer, LineItem, OrderStatus, ProviderOrderId, TransactionId};

/// Whether a provider finalizes the charge as part of authorization, or requires a separate
/// capture step. The handlers use this to decide whether to arm an auto-capture task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// The authorization call completes the charge inline (Square-style).
    Immediate,
    /// A hold is placed and must be captured (or voided) later (Stripe / Apple Pay style).
    Deferred,
}

/// Merchant-scoped credentials and routing context for a provider call.
#[derive(Debug, Clone, Default)]
pub struct MerchantContext {
    pub merchant_id: String,
    /// Provider location/store identifier, where the provider has one (Square locations).
    pub location_id: Option<String>,
    /// Per-merchant access token. When absent, adapters fall back to their configured default.
    pub access_token: Option<Secret<String>>,
}

impl MerchantContext {
    pub fn new<S: Into<String>>(merchant_id: S) -> Self {
        Self { merchant_id: merchant_id.into(), ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// The one-time payment token (card nonce, Apple Pay token, payment-method id) supplied by
    /// the client SDK.
    pub source_token: String,
    pub amount: Money,
    pub currency: String,
    pub merchant: MerchantContext,
    pub customer: Option<Customer>,
}

/// The outcome of a successful authorization.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub provider_transaction_id: TransactionId,
    /// The order status the provider's capture model implies at this point: `Submitted` for
    /// immediate-capture providers, `Authorized` for deferred ones.
    pub status: OrderStatus,
    pub receipt_url: Option<String>,
    pub receipt_number: Option<String>,
}

/// Decline reason codes, sanitized for the client. The raw provider detail is logged at the
/// adapter boundary and never crosses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    CardDeclined,
    InsufficientFunds,
    CvvFailure,
    AvsFailure,
    CardExpired,
    Generic,
}

impl Display for DeclineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            DeclineReason::CardDeclined => "The card was declined.",
            DeclineReason::InsufficientFunds => "The card has insufficient funds.",
            DeclineReason::CvvFailure => "The security code could not be verified.",
            DeclineReason::AvsFailure => "The billing address could not be verified.",
            DeclineReason::CardExpired => "The card has expired.",
            DeclineReason::Generic => "The payment could not be completed.",
        };
        write!(f, "{msg}")
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("The payment was declined. {0}")]
    Declined(DeclineReason),
    #[error("The capture could not be completed. {0}")]
    CaptureFailed(String),
    #[error("The provider rejected the request. {0}")]
    Rejected(String),
    #[error("The provider could not be reached. {0}")]
    Transport(String),
}

/// The uniform provider adapter contract.
///
/// Every provider has a different authorize/capture timing model, a different wire shape and a
/// different event vocabulary. All of that branching lives behind this trait so the
/// reconciliation engine stays provider-agnostic.
///
/// Idempotence contract: `capture` on an already-captured transaction and `cancel_or_refund` on
/// an already-cancelled one both succeed silently.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    fn name(&self) -> &'static str;

    fn capture_mode(&self) -> CaptureMode;

    /// Place a hold on the customer's payment source. Declines surface as
    /// [`ProviderError::Declined`] with a distinct reason code.
    async fn authorize(&self, request: AuthorizeRequest) -> Result<Authorization, ProviderError>;

    /// Place the merchant-visible order object alongside the payment. Providers without an order
    /// concept return `Ok(None)`.
    async fn create_merchant_order(
        &self,
        items: &[LineItem],
        merchant: &MerchantContext,
    ) -> Result<Option<ProviderOrderId>, ProviderError>;

    /// Finalize a previously authorized payment. Returns the captured amount.
    async fn capture(&self, provider_txid: &TransactionId) -> Result<Money, ProviderError>;

    /// Void an uncaptured authorization, or refund a captured one. Returns the refund id where
    /// the provider issues one.
    async fn cancel_or_refund(&self, provider_txid: &TransactionId) -> Result<Option<String>, ProviderError>;

    /// The order status implied immediately after a successful capture, fed through the normal
    /// transition policy so a more specific status already on the record is never regressed.
    fn post_capture_status(&self) -> OrderStatus {
        OrderStatus::Submitted
    }

    /// Map a vendor order-level state into the internal vocabulary. Pure.
    fn map_order_state(&self, state: &str) -> OrderStatus {
        map_vendor_order_state(state)
    }

    /// Map a vendor fulfillment-level state into the internal vocabulary. Pure.
    fn map_fulfillment_state(&self, state: &str) -> OrderStatus {
        map_vendor_fulfillment_state(state)
    }
}

/// The canonical vendor order-state table. Unrecognized states map to the least specific
/// plausible status rather than failing, so an unknown vendor state can never clobber a more
/// advanced one.
pub fn map_vendor_order_state(state: &str) -> OrderStatus {
    match state {
        "OPEN" => OrderStatus::Submitted,
        "COMPLETED" => OrderStatus::Completed,
        "CANCELED" => OrderStatus::Cancelled,
        "DRAFT" => OrderStatus::Draft,
        _ => OrderStatus::Submitted,
    }
}

/// The canonical vendor fulfillment-state table.
pub fn map_vendor_fulfillment_state(state: &str) -> OrderStatus {
    match state {
        "PROPOSED" => OrderStatus::Submitted,
        "RESERVED" => OrderStatus::InProgress,
        "PREPARED" => OrderStatus::Ready,
        "FULFILLED" => OrderStatus::Completed,
        "CANCELED" => OrderStatus::Cancelled,
        _ => OrderStatus::Submitted,
    }
}
