//! Reconciliation engine for the order-fulfillment system.
//!
//! Ties together the stores, the payment-provider adapters, and the
//! notification sink: order creation with inventory reservation and
//! compensation, payment initiation and retry, idempotent settlement
//! callbacks, cancellation, and fulfilment status administration.

pub mod callback;
pub mod engine;
pub mod error;
pub mod notify;

pub use callback::{CallbackEvent, CallbackOutcome, PaymentResolution};
pub use engine::{NewOrder, OrderConfirmation, OrderLine, Pricing, ReconciliationEngine};
pub use error::{EngineError, Result};
pub use notify::{InMemoryNotificationSink, LogNotificationSink, Notification, NotificationSink};
