//! Shared identifier types used across the order-fulfillment crates.

mod types;

pub use types::{OrderId, PaymentId, ProductId};
