//! Payment provider adapters.
//!
//! Each adapter folds one provider's wire protocol, authorize/capture timing model and error
//! vocabulary behind the [`PaymentProvider`](crate::traits::PaymentProvider) trait, so nothing
//! above this module ever branches on which provider a payment went through.

mod external_pos;
mod square;
mod stripe;

pub use external_pos::{ExternalPosAdapter, ExternalPosConfig};
pub use square::{SquareAdapter, SquareConfig};
pub use stripe::{StripeAdapter, StripeConfig};

/// Idempotency key for provider calls that require one. Providers cap key length, so this stays
/// well under 45 characters.
pub(crate) fn idempotency_key() -> String {
    format!("bp-{:016x}{:08x}", rand::random::<u64>(), rand::random::<u32>())
}

/// Idempotency key for refunds. Refunds are issued at most once per payment, so the key is
/// derived from the payment id: a replayed cancel hands the provider the same key and gets the
/// original refund back instead of minting a second one.
pub(crate) fn refund_idempotency_key(provider_txid: &crate::db_types::TransactionId) -> String {
    let mut key = format!("refund-{provider_txid}");
    // Square caps idempotency keys at 45 characters.
    key.truncate(45);
    key
}
