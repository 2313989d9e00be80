//! Store error types.

use common::{OrderId, ProductId};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested product does not exist.
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: ProductId },

    /// A conditional stock decrement found fewer units than requested.
    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock { product_id: ProductId, requested: u32 },

    /// An insert would create a second open payment attempt for the order.
    #[error("Order {order_id} already has a pending payment")]
    PaymentAlreadyPending { order_id: OrderId },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted value could not be decoded into its domain type.
    #[error("Corrupt stored value: {0}")]
    Decode(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
