mod order_store;
mod payment_provider;

pub use order_store::{OrderStore, OrderStoreError};
pub use payment_provider::{
    map_vendor_fulfillment_state,
    map_vendor_order_state,
    Authorization,
    AuthorizeRequest,
    CaptureMode,
    DeclineReason,
    MerchantContext,
    PaymentProvider,
    ProviderError,
};
