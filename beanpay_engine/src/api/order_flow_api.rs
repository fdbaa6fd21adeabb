use std::fmt::Debug;

use bp_common::Money;
use log::*;

use crate::{
    api::errors::OrderFlowError,
    capture::CaptureScheduler,
    db_types::{
        Customer,
        LineItem,
        NewOrder,
        Order,
        OrderStatus,
        OrderUpdate,
        PaymentMethod,
        ProviderOrderId,
        TransactionId,
    },
    events::{EventProducers, OrderAnnulledEvent, OrderReadyEvent},
    traits::{AuthorizeRequest, MerchantContext, OrderStore, OrderStoreError, PaymentProvider, ProviderError},
};

/// The decision the transition policy takes for one incoming status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// The incoming status wins; write it.
    Accepted(OrderStatus),
    /// The incoming status is stale, duplicate, or forbidden; the record keeps its current value.
    Unchanged(OrderStatus),
}

/// The order status transition function, shared by the explicit-action path and the webhook path.
///
/// The policy, in precedence order:
/// 1. A terminal status (`Completed`, `Cancelled`) is never regressed, not even by a
///    later-arriving, differently-sourced event. Re-applying the same terminal value is a no-op.
/// 2. An incoming status that is strictly *less specific* than the current one is a no-op: an
///    order-level `OPEN → SUBMITTED` mapping must not overwrite a fulfillment-level `READY` that
///    already landed from a separate event stream.
/// 3. Re-applying the current status is a no-op (duplicate webhook delivery, client retry).
/// 4. Anything else is accepted.
///
/// Because of 1–3 the outcome of two racing valid transitions converges to the same final state
/// regardless of arrival order, which is what lets the store get away with per-record atomic
/// merges instead of locks.
pub fn apply(current: OrderStatus, incoming: OrderStatus) -> StatusTransition {
    if current.is_terminal() || incoming == current || incoming.specificity() < current.specificity() {
        StatusTransition::Unchanged(current)
    } else {
        StatusTransition::Accepted(incoming)
    }
}

/// A place-order request, after handler-level validation and merchant credential resolution.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub source_token: String,
    pub amount: Money,
    pub currency: String,
    pub merchant: MerchantContext,
    pub payment_method: PaymentMethod,
    pub items: Vec<LineItem>,
    pub customer: Option<Customer>,
}

/// A provider event after the ingress has verified, parsed, and vocabulary-mapped it.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub provider_order_id: ProviderOrderId,
    pub incoming_status: OrderStatus,
}

/// What reconciliation did with a normalized event. Every variant is a successful outcome from
/// the provider's point of view; the ingress answers 2xx for all of them.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Applied { order: Order, previous: OrderStatus },
    NoOp { order: Order },
    UnknownOrder(ProviderOrderId),
}

/// `OrderFlowApi` owns the authoritative order status. It applies provider webhook events and
/// client-initiated actions to the order record under the precedence policy of [`apply`], and
/// drives the side effects (capture requests, ready notifications) that hang off accepted
/// transitions.
#[derive(Clone)]
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: OrderStore
{
    /// Place a new order: authorize the payment, place the merchant order where the provider has
    /// one, and write the order record.
    ///
    /// A declined or failed authorization stops the flow before any repository write, so no
    /// partial order record ever exists for a failed payment. Failures *after* a successful
    /// authorization are not rolled back automatically: the charge stands, the condition is
    /// logged as requiring operator attention, and the record is written with whatever was
    /// obtained.
    pub async fn place_order<P: PaymentProvider>(
        &self,
        provider: &P,
        request: NewOrderRequest,
    ) -> Result<Order, OrderFlowError> {
        let NewOrderRequest { source_token, amount, currency, merchant, payment_method, items, customer } = request;
        let auth = provider
            .authorize(AuthorizeRequest {
                source_token,
                amount,
                currency: currency.clone(),
                merchant: merchant.clone(),
                customer: customer.clone(),
            })
            .await
            .map_err(|e| match e {
                ProviderError::Declined(reason) => {
                    info!("🔄️💳️ Authorization declined by {}: {reason}", provider.name());
                    OrderFlowError::AuthorizationDeclined(reason)
                },
                other => {
                    warn!("🔄️💳️ Authorization via {} failed: {other}", provider.name());
                    OrderFlowError::ProviderUnavailable(other.to_string())
                },
            })?;
        let txid = auth.provider_transaction_id.clone();
        debug!("🔄️💳️ Payment [{txid}] authorized via {} for {amount} {currency}", provider.name());
        let provider_order_id = match provider.create_merchant_order(&items, &merchant).await {
            Ok(id) => id,
            Err(e) => {
                // The charge stands. Without a provider order id, webhook correlation for this
                // order is permanently impossible, so this must never be silently masked.
                error!(
                    "🔄️💳️ Payment [{txid}] is authorized, but the merchant order could not be created: {e}. \
                     Operator attention required."
                );
                None
            },
        };
        let mut new_order = NewOrder::new(txid.clone(), auth.status, amount, merchant.merchant_id, payment_method)
            .with_currency(currency)
            .with_items(items);
        new_order.customer = customer;
        new_order.provider_order_id = provider_order_id;
        new_order.receipt_url = auth.receipt_url;
        new_order.receipt_number = auth.receipt_number;
        match self.db.create_order(new_order).await {
            Ok(order) => {
                info!("🔄️💳️ Order [{txid}] recorded with status {}", order.status);
                Ok(order)
            },
            Err(OrderStoreError::AlreadyExists(_)) => {
                info!("🔄️💳️ Order [{txid}] already exists. Treating the create as idempotent.");
                self.db.fetch_order(&txid).await?.ok_or(OrderFlowError::OrderNotFound(txid))
            },
            Err(e) => {
                error!(
                    "🔄️💳️ Payment [{txid}] is authorized, but the order record could not be written: {e}. \
                     The charge has NOT been rolled back; operator attention required."
                );
                Err(e.into())
            },
        }
    }

    /// Cancel an order on explicit user intent.
    ///
    /// Any pending auto-capture task is cancelled *before* the provider call, so the capture
    /// cannot fire after cancellation was initiated. On provider failure the order status is left
    /// unchanged and the action is safely retryable. On success the status is forced to
    /// `Cancelled`: user-initiated cancellation wins over every non-terminal state.
    pub async fn cancel_order<P: PaymentProvider>(
        &self,
        provider: &P,
        scheduler: &CaptureScheduler,
        txid: &TransactionId,
    ) -> Result<Order, OrderFlowError> {
        let order = self.db.fetch_order(txid).await?.ok_or_else(|| OrderFlowError::OrderNotFound(txid.clone()))?;
        if order.status == OrderStatus::Cancelled {
            info!("🔄️❌️ Order [{txid}] is already cancelled. Nothing to do.");
            return Ok(order);
        }
        if order.status == OrderStatus::Completed {
            return Err(OrderFlowError::CancellationFailed("The order has already been completed.".to_string()));
        }
        if scheduler.cancel(txid) {
            debug!("🔄️❌️ Pending auto-capture for [{txid}] cancelled ahead of the provider call");
        }
        provider.cancel_or_refund(txid).await.map_err(|e| {
            warn!("🔄️❌️ {} could not cancel/refund [{txid}]: {e}. Order status left unchanged.", provider.name());
            OrderFlowError::CancellationFailed(e.to_string())
        })?;
        let previous = order.status;
        let updated = self.db.update_order(txid, OrderUpdate::default().with_status(OrderStatus::Cancelled)).await?;
        info!("🔄️❌️ Order [{txid}] cancelled (was {previous})");
        self.call_order_annulled_hook(&updated, previous).await;
        Ok(updated)
    }

    /// Finalize an authorized payment, timer- or client-driven.
    ///
    /// On provider failure the status is left unchanged and the capture may be retried. A capture
    /// arriving for a terminal order (the loser of a cancel/capture race) is a no-op success.
    pub async fn capture_order<P: PaymentProvider>(
        &self,
        provider: &P,
        merchant: &MerchantContext,
        txid: &TransactionId,
    ) -> Result<Order, OrderFlowError> {
        let order = self.db.fetch_order(txid).await?.ok_or_else(|| OrderFlowError::OrderNotFound(txid.clone()))?;
        if order.status.is_terminal() {
            warn!("🔄️🏦️ Ignoring capture request for [{txid}]: order is already {}", order.status);
            return Ok(order);
        }
        let amount = provider.capture(txid).await.map_err(|e| {
            warn!("🔄️🏦️ Capture of [{txid}] failed: {e}. Status left unchanged; the capture may be retried.");
            OrderFlowError::CaptureFailed(e.to_string())
        })?;
        debug!("🔄️🏦️ Captured {amount} for [{txid}] via {}", provider.name());
        let mut update = OrderUpdate::default();
        if order.provider_order_id.is_none() {
            match provider.create_merchant_order(&order.items, merchant).await {
                Ok(Some(oid)) => update = update.with_provider_order_id(oid),
                Ok(None) => {},
                Err(e) => error!(
                    "🔄️🏦️ Payment [{txid}] is captured, but the merchant order could not be created: {e}. \
                     Operator attention required."
                ),
            }
        }
        if let StatusTransition::Accepted(next) = apply(order.status, provider.post_capture_status()) {
            update = update.with_status(next);
        }
        if update.is_empty() {
            return Ok(order);
        }
        let updated = self.db.update_order(txid, update).await?;
        Ok(updated)
    }

    /// Reconcile a normalized provider event against the authoritative record.
    ///
    /// Every anomaly (unknown order, duplicate order ids, stale status) is a logged no-op, never
    /// an error: the provider must not retry a condition that will never resolve. The ready
    /// notification fires only when a transition *into* `Ready` is accepted, and only after the
    /// status write has committed.
    pub async fn process_provider_event(&self, event: NormalizedEvent) -> Result<ReconcileOutcome, OrderFlowError> {
        let mut matches = self.db.fetch_orders_by_provider_order_id(&event.provider_order_id).await?;
        if matches.len() > 1 {
            warn!(
                "🔄️📦️ {} order records share provider order id {}. This is a data anomaly; reconciling the oldest.",
                matches.len(),
                event.provider_order_id
            );
        }
        let order = match matches.is_empty() {
            true => {
                info!("🔄️📦️ Event for unknown provider order {}. Ignoring.", event.provider_order_id);
                return Ok(ReconcileOutcome::UnknownOrder(event.provider_order_id));
            },
            false => matches.remove(0),
        };
        match apply(order.status, event.incoming_status) {
            StatusTransition::Unchanged(current) => {
                debug!(
                    "🔄️📦️ Event ({current} -> {}) for [{}] is stale or duplicate. No-op.",
                    event.incoming_status, order.transaction_id
                );
                Ok(ReconcileOutcome::NoOp { order })
            },
            StatusTransition::Accepted(next) => {
                let previous = order.status;
                let updated =
                    self.db.update_order(&order.transaction_id, OrderUpdate::default().with_status(next)).await?;
                info!("🔄️📦️ Order [{}] moved {previous} -> {next}", updated.transaction_id);
                if next == OrderStatus::Ready {
                    self.call_order_ready_hook(&updated).await;
                }
                if next == OrderStatus::Cancelled {
                    self.call_order_annulled_hook(&updated, previous).await;
                }
                Ok(ReconcileOutcome::Applied { order: updated, previous })
            },
        }
    }

    /// Point read, for handlers that need to route on `payment_method` before acting.
    pub async fn fetch_order(&self, txid: &TransactionId) -> Result<Option<Order>, OrderFlowError> {
        Ok(self.db.fetch_order(txid).await?)
    }

    /// Hard delete backing the explicit "clear history" user action.
    pub async fn delete_order(&self, txid: &TransactionId) -> Result<(), OrderFlowError> {
        Ok(self.db.delete_order(txid).await?)
    }

    async fn call_order_ready_hook(&self, order: &Order) {
        for producer in &self.producers.order_ready_producer {
            debug!("🔄️📦️ Notifying order-ready hook subscribers for [{}]", order.transaction_id);
            producer.publish_event(OrderReadyEvent::new(order.clone())).await;
        }
    }

    async fn call_order_annulled_hook(&self, order: &Order, previous: OrderStatus) {
        for producer in &self.producers.order_annulled_producer {
            producer.publish_event(OrderAnnulledEvent::new(order.clone(), previous)).await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ALL: [OrderStatus; 8] = [
        OrderStatus::Draft,
        OrderStatus::Pending,
        OrderStatus::Authorized,
        OrderStatus::Submitted,
        OrderStatus::InProgress,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn terminal_statuses_are_locked() {
        for terminal in [OrderStatus::Completed, OrderStatus::Cancelled] {
            for incoming in ALL {
                assert_eq!(apply(terminal, incoming), StatusTransition::Unchanged(terminal));
            }
        }
    }

    #[test]
    fn less_specific_statuses_never_regress_the_record() {
        for current in ALL {
            for incoming in ALL {
                if incoming.specificity() < current.specificity() {
                    assert_eq!(
                        apply(current, incoming),
                        StatusTransition::Unchanged(current),
                        "{incoming} must not overwrite {current}"
                    );
                }
            }
        }
    }

    #[test]
    fn reapplying_the_current_status_is_a_noop() {
        for s in ALL {
            assert_eq!(apply(s, s), StatusTransition::Unchanged(s));
        }
    }

    #[test]
    fn forward_transitions_are_accepted() {
        use OrderStatus::*;
        assert_eq!(apply(Authorized, Submitted), StatusTransition::Accepted(Submitted));
        assert_eq!(apply(Submitted, InProgress), StatusTransition::Accepted(InProgress));
        assert_eq!(apply(InProgress, Ready), StatusTransition::Accepted(Ready));
        assert_eq!(apply(Ready, Completed), StatusTransition::Accepted(Completed));
        // Cancellation is reachable from any non-terminal state, including a skip-ahead.
        assert_eq!(apply(Authorized, Cancelled), StatusTransition::Accepted(Cancelled));
        assert_eq!(apply(Ready, Cancelled), StatusTransition::Accepted(Cancelled));
        // Skipping intermediate states is fine: webhooks may arrive out of order.
        assert_eq!(apply(Submitted, Ready), StatusTransition::Accepted(Ready));
    }

    #[test]
    fn stale_order_level_event_cannot_undo_a_fulfillment_update() {
        use OrderStatus::*;
        // OPEN maps to Submitted; PREPARED maps to Ready. Whichever arrives second, the record
        // converges on Ready.
        let first = apply(Submitted, Ready);
        assert_eq!(first, StatusTransition::Accepted(Ready));
        let second = apply(Ready, Submitted);
        assert_eq!(second, StatusTransition::Unchanged(Ready));
    }

    #[test]
    fn legacy_statuses_always_lose() {
        use OrderStatus::*;
        for current in [Authorized, Submitted, InProgress, Ready] {
            assert_eq!(apply(current, Draft), StatusTransition::Unchanged(current));
            assert_eq!(apply(current, Pending), StatusTransition::Unchanged(current));
        }
        // But a record still carrying a legacy status accepts any live one.
        assert_eq!(apply(Draft, Submitted), StatusTransition::Accepted(Submitted));
        assert_eq!(apply(Pending, Authorized), StatusTransition::Accepted(Authorized));
    }
}
