use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatus};

/// Emitted exactly once when a reconciled transition lands an order in `Ready`. Re-applying
/// `Ready` is a no-op in the engine and does not re-emit this event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReadyEvent {
    pub order: Order,
}

impl OrderReadyEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when an order is cancelled, either by explicit user action or by a provider event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub previous_status: OrderStatus,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order, previous_status: OrderStatus) -> Self {
        Self { order, previous_status }
    }
}
