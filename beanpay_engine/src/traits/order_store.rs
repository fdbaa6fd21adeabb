use thiserror::Error;

use crate::db_types::{NewOrder, Order, OrderUpdate, ProviderOrderId, TransactionId};

/// The durable order repository.
///
/// Orders are keyed by the provider-assigned transaction identifier. All operations are
/// single-document: the reconciliation engine coordinates concurrent writers through its
/// transition policy, not through store-level locking, so a per-record atomic merge is all that
/// is required of implementations.
#[allow(async_fn_in_trait)]
pub trait OrderStore {
    /// Create a new order record. Fails with [`OrderStoreError::AlreadyExists`] if a record for
    /// the transaction id is already present. Stamps `created_at` and `updated_at`.
    async fn create_order(&self, order: NewOrder) -> Result<Order, OrderStoreError>;

    /// Partial merge against an existing record. Only fields present in `update` are written.
    /// Stamps `updated_at`. Fails with [`OrderStoreError::NotFound`] if the record is absent.
    async fn update_order(&self, id: &TransactionId, update: OrderUpdate) -> Result<Order, OrderStoreError>;

    /// Point read by transaction id.
    async fn fetch_order(&self, id: &TransactionId) -> Result<Option<Order>, OrderStoreError>;

    /// Secondary-field lookup used by the webhook path: inbound events only know the provider's
    /// order id. Expected to return 0 or 1 records; more than one is a data anomaly that callers
    /// log rather than fail on.
    async fn fetch_orders_by_provider_order_id(
        &self,
        id: &ProviderOrderId,
    ) -> Result<Vec<Order>, OrderStoreError>;

    /// Hard delete. Only reachable from the explicit "clear history" user action.
    async fn delete_order(&self, id: &TransactionId) -> Result<(), OrderStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("An order already exists for transaction {0}")]
    AlreadyExists(TransactionId),
    #[error("No order found for transaction {0}")]
    NotFound(TransactionId),
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        OrderStoreError::DatabaseError(e.to_string())
    }
}
