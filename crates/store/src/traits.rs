//! Store traits.

use async_trait::async_trait;
use common::{OrderId, PaymentId, ProductId};
use domain::{Order, OrderStatus, Otp, OtpPurpose, Payment, PhoneNumber};

use crate::error::Result;
use crate::product::Product;

/// The inventory ledger: owns per-product stock counters.
///
/// `reserve_stock` must be a single atomic read-modify-write against the
/// persisted counter so concurrent reservations for the same product can
/// never over-allocate; `restore_stock` is unconditional addition, used
/// for cancellation and failed-payment compensation.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Inserts or replaces a product (catalog collaborator surface).
    async fn upsert_product(&self, product: &Product) -> Result<()>;

    /// Fetches a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Conditionally decrements stock; fails with
    /// [`StoreError::InsufficientStock`](crate::StoreError::InsufficientStock)
    /// when fewer than `quantity` units remain.
    async fn reserve_stock(&self, id: ProductId, quantity: u32) -> Result<()>;

    /// Unconditionally returns `quantity` units to stock.
    async fn restore_stock(&self, id: ProductId, quantity: u32) -> Result<()>;
}

/// Persistence for orders and their frozen line-item snapshots.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order together with its items in one transaction.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Fetches an order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders, newest first, optionally filtered by status.
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;

    /// Persists the mutable fields of an existing order (status, payment
    /// status, tracking, delivery timestamp, stock-release flag).
    async fn update_order(&self, order: &Order) -> Result<()>;

    /// Atomically claims the one-time right to restore the order's
    /// reserved stock. Returns false when the claim was already taken, so
    /// concurrent settlement paths restore at most once.
    async fn claim_stock_release(&self, order_id: OrderId) -> Result<bool>;
}

/// Persistence for payment attempts.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a new payment attempt. Rejects a non-terminal insert with
    /// [`crate::StoreError::PaymentAlreadyPending`] when the order already
    /// has an open attempt.
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    /// Persists the mutable fields of an existing payment.
    async fn update_payment(&self, payment: &Payment) -> Result<()>;

    /// Fetches a payment by internal ID.
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// Exact lookup by the provider transaction handle.
    async fn find_payment_by_transaction_id(&self, transaction_id: &str)
    -> Result<Option<Payment>>;

    /// Returns the order's non-terminal payment, if any. At most one may
    /// exist at a time.
    async fn find_pending_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;
}

/// Persistence for one-time passwords.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Persists a newly issued OTP.
    async fn insert_otp(&self, otp: &Otp) -> Result<()>;

    /// Returns the latest unused, unexpired OTP for the phone and purpose.
    async fn find_active_otp(
        &self,
        phone: &PhoneNumber,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>>;

    /// Marks the matching unused OTP consumed; returns false if none matched.
    async fn mark_otp_used(
        &self,
        phone: &PhoneNumber,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<bool>;
}

/// Umbrella trait for a storage backend that provides every store.
pub trait Store: ProductStore + OrderStore + PaymentStore + OtpStore {}

impl<T> Store for T where T: ProductStore + OrderStore + PaymentStore + OtpStore {}
