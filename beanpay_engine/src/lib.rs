//! The BeanPay order engine.
//!
//! This crate holds everything about an order's life that is independent of the HTTP surface:
//!
//! * The canonical order record and status vocabulary ([`db_types`]).
//! * The status transition policy and the order flow API ([`api`]) that every status write in the
//!   system goes through. Statuses only ever become more specific, terminal statuses are locked,
//!   and replayed or out-of-order provider events collapse into no-ops.
//! * The provider adapter contract ([`traits::PaymentProvider`]) and the concrete Square, Stripe
//!   and POS-bridge adapters ([`adapters`]).
//! * The auto-capture timer registry ([`capture`]).
//! * Order lifecycle event hooks ([`events`]) that let the server layer attach side effects (push
//!   notifications and the like) without the engine knowing about them.
//!
//! The SQLite repository implementation lives behind the `sqlite` feature, which is on by
//! default.

pub mod adapters;
pub mod api;
pub mod capture;
pub mod db_types;
pub mod events;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use api::{apply, NewOrderRequest, NormalizedEvent, OrderFlowApi, OrderFlowError, ReconcileOutcome, StatusTransition};
pub use capture::CaptureScheduler;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
