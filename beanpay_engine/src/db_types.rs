use std::{fmt::Display, str::FromStr};

use bp_common::Money;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------   TransactionId   -----------------------------------------------------------
/// The provider-assigned payment identifier. This is the primary key for order records: it is
/// assigned by the payment provider at authorization time and is immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Into<String>> From<S> for TransactionId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   ProviderOrderId   ---------------------------------------------------------
/// The provider-assigned order/fulfillment identifier. Assigned asynchronously for some providers,
/// and the only key that inbound webhook events carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ProviderOrderId(pub String);

impl ProviderOrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Into<String>> From<S> for ProviderOrderId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for ProviderOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------     OrderStatus     ---------------------------------------------------------
/// The authoritative order status.
///
/// The variants are ordered by *specificity*: a status later in the pickup lifecycle carries more
/// information than an earlier one, and the reconciliation engine never lets a less specific status
/// overwrite a more specific one (see [`crate::api::apply`]).
///
/// `Draft` and `Pending` are legacy values that older records may still carry. They are accepted
/// on read, rank below every live status, and are never produced by new writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Pending,
    /// Payment authorized; not yet a merchant-visible order.
    Authorized,
    /// Order handed to the merchant.
    Submitted,
    /// Merchant is preparing the order.
    #[serde(alias = "active")]
    InProgress,
    /// Ready for pickup.
    Ready,
    /// Picked up. Terminal.
    Completed,
    /// Cancelled by the user or merchant. Terminal, reachable from any non-terminal state.
    Cancelled,
}

impl OrderStatus {
    /// The specificity rank used by the reconciliation policy. Higher ranks always win over lower
    /// ones; equal non-terminal ranks are re-applications and result in no-ops.
    pub fn specificity(&self) -> u8 {
        match self {
            OrderStatus::Draft | OrderStatus::Pending => 0,
            OrderStatus::Authorized => 1,
            OrderStatus::Submitted => 2,
            OrderStatus::InProgress => 3,
            OrderStatus::Ready => 4,
            OrderStatus::Completed | OrderStatus::Cancelled => 5,
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Authorized => "AUTHORIZED",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Ready => "READY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Legacy records carry "DRAFT", "PENDING" and "active"; keep accepting them on read.
        match s {
            "AUTHORIZED" => Ok(Self::Authorized),
            "SUBMITTED" => Ok(Self::Submitted),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "READY" => Ok(Self::Ready),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "DRAFT" => Ok(Self::Draft),
            "PENDING" => Ok(Self::Pending),
            "active" | "Active" | "ACTIVE" => Ok(Self::InProgress),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status read from the store: {value}. Defaulting to Submitted");
            OrderStatus::Submitted
        })
    }
}

//--------------------------------------    PaymentMethod    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    ApplePay,
    External,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::ApplePay => write!(f, "apple_pay"),
            PaymentMethod::External => write!(f, "external"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(Self::Card),
            "apple_pay" => Ok(Self::ApplePay),
            "external" => Ok(Self::External),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

impl From<String> for PaymentMethod {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment method read from the store: {value}. Defaulting to card");
            PaymentMethod::Card
        })
    }
}

//--------------------------------------       LineItem      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    /// Free-text customization ("oat milk, extra shot").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LineItem {
    pub fn new<S: Into<String>>(name: S, quantity: u32, unit_price: Money) -> Self {
        Self { name: name.into(), quantity, unit_price, note: None }
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

//--------------------------------------       Customer      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

//--------------------------------------        Order        ---------------------------------------------------------
/// The authoritative order record. Only the reconciliation engine and the explicit user-initiated
/// cancel/capture actions ever write `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub transaction_id: TransactionId,
    pub provider_order_id: Option<ProviderOrderId>,
    pub status: OrderStatus,
    pub amount: Money,
    pub currency: String,
    pub merchant_id: String,
    pub payment_method: PaymentMethod,
    pub items: Vec<LineItem>,
    pub customer: Option<Customer>,
    pub receipt_url: Option<String>,
    pub receipt_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder      ---------------------------------------------------------
/// The creation payload written by the payment handler once an authorization has succeeded.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub transaction_id: TransactionId,
    pub provider_order_id: Option<ProviderOrderId>,
    pub status: OrderStatus,
    pub amount: Money,
    pub currency: String,
    pub merchant_id: String,
    pub payment_method: PaymentMethod,
    pub items: Vec<LineItem>,
    pub customer: Option<Customer>,
    pub receipt_url: Option<String>,
    pub receipt_number: Option<String>,
}

impl NewOrder {
    pub fn new(
        transaction_id: TransactionId,
        status: OrderStatus,
        amount: Money,
        merchant_id: String,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            transaction_id,
            provider_order_id: None,
            status,
            amount,
            currency: "USD".to_string(),
            merchant_id,
            payment_method,
            items: Vec::new(),
            customer: None,
            receipt_url: None,
            receipt_number: None,
        }
    }

    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_provider_order_id(mut self, id: ProviderOrderId) -> Self {
        self.provider_order_id = Some(id);
        self
    }
}

//--------------------------------------      OrderUpdate    ---------------------------------------------------------
/// A partial merge against an order record. Only the fields that are present are written; the
/// store never touches absent fields.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub new_status: Option<OrderStatus>,
    pub new_provider_order_id: Option<ProviderOrderId>,
    pub new_receipt_url: Option<String>,
    pub new_receipt_number: Option<String>,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_status.is_none()
            && self.new_provider_order_id.is_none()
            && self.new_receipt_url.is_none()
            && self.new_receipt_number.is_none()
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn with_provider_order_id(mut self, id: ProviderOrderId) -> Self {
        self.new_provider_order_id = Some(id);
        self
    }

    pub fn with_receipt_url<S: Into<String>>(mut self, url: S) -> Self {
        self.new_receipt_url = Some(url.into());
        self
    }

    pub fn with_receipt_number<S: Into<String>>(mut self, number: S) -> Self {
        self.new_receipt_number = Some(number.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_specificity_is_totally_ordered() {
        use OrderStatus::*;
        let lifecycle = [Authorized, Submitted, InProgress, Ready];
        for pair in lifecycle.windows(2) {
            assert!(pair[0].specificity() < pair[1].specificity());
        }
        assert!(Ready.specificity() < Completed.specificity());
        assert_eq!(Completed.specificity(), Cancelled.specificity());
        assert!(Draft.specificity() < Authorized.specificity());
        assert_eq!(Draft.specificity(), Pending.specificity());
    }

    #[test]
    fn only_completed_and_cancelled_are_terminal() {
        use OrderStatus::*;
        for s in [Draft, Pending, Authorized, Submitted, InProgress, Ready] {
            assert!(!s.is_terminal());
        }
        assert!(Completed.is_terminal());
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn legacy_status_values_parse_on_read() {
        assert_eq!("DRAFT".parse::<OrderStatus>().unwrap(), OrderStatus::Draft);
        assert_eq!("PENDING".parse::<OrderStatus>().unwrap(), OrderStatus::Pending);
        assert_eq!("active".parse::<OrderStatus>().unwrap(), OrderStatus::InProgress);
        assert!("BOGUS".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_round_trips_through_display() {
        use OrderStatus::*;
        for s in [Authorized, Submitted, InProgress, Ready, Completed, Cancelled, Draft, Pending] {
            assert_eq!(s.to_string().parse::<OrderStatus>().unwrap(), s);
        }
    }

    #[test]
    fn unknown_stored_status_defaults_to_submitted() {
        assert_eq!(OrderStatus::from("???".to_string()), OrderStatus::Submitted);
    }

    #[test]
    fn line_items_serialize_without_empty_note() {
        let item = LineItem::new("Latte", 1, Money::from(450));
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("note"));
        let item = item.with_note("oat milk");
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("oat milk"));
    }
}
