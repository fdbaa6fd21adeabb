pub mod errors;
pub mod order_flow_api;

pub use errors::OrderFlowError;
pub use order_flow_api::{apply, NewOrderRequest, NormalizedEvent, OrderFlowApi, ReconcileOutcome, StatusTransition};
