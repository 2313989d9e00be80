//! Engine error types.

use common::{OrderId, ProductId};
use domain::{DomainError, OrderError, PaymentError};
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A requested product does not exist in the catalog.
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: ProductId },

    /// Fewer units remain than an order line requested.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// The order does not exist.
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: OrderId },

    /// No payment matches the given handle.
    #[error("Payment not found: {transaction_id}")]
    PaymentNotFound { transaction_id: String },

    /// The payment provider could not be reached. The order was persisted
    /// and payment can be retried against it.
    #[error("Payment provider unavailable for order {order_id}: {reason}")]
    GatewayUnavailable { order_id: OrderId, reason: String },

    /// The payment provider explicitly refused the push. The order was
    /// persisted and payment can be retried against it.
    #[error("Payment provider rejected order {order_id}: {description}")]
    GatewayRejected {
        order_id: OrderId,
        description: String,
    },

    /// The order already has a payment attempt awaiting settlement.
    #[error("Order {order_id} already has a pending payment")]
    PaymentAlreadyPending { order_id: OrderId },

    /// The order is delivered or already cancelled.
    #[error("Order {order_id} cannot be cancelled")]
    OrderNotCancellable { order_id: OrderId },

    /// The order is paid, cancelled, or delivered; no further payment
    /// attempts are accepted.
    #[error("Order {order_id} is not payable")]
    OrderNotPayable { order_id: OrderId },

    /// A domain state machine refused a transition.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A storage error occurred.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OrderError> for EngineError {
    fn from(e: OrderError) -> Self {
        Self::Domain(e.into())
    }
}

impl From<PaymentError> for EngineError {
    fn from(e: PaymentError) -> Self {
        Self::Domain(e.into())
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
