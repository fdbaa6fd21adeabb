use thiserror::Error;

use crate::{
    db_types::TransactionId,
    traits::{DeclineReason, OrderStoreError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error(transparent)]
    StoreError(#[from] OrderStoreError),
    #[error("The payment was declined. {0}")]
    AuthorizationDeclined(DeclineReason),
    #[error("The payment provider is unavailable. {0}")]
    ProviderUnavailable(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(TransactionId),
    #[error("The order could not be cancelled. {0}")]
    CancellationFailed(String),
    #[error("The payment could not be captured. {0}")]
    CaptureFailed(String),
}
