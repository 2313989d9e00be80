//! The order aggregate.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;
use crate::payment::Provider;

use super::status::{OrderStatus, PaymentStatus};
use super::value_objects::{Address, OrderItem, OrderNumber, OrderTotals, PhoneNumber};

/// Errors raised by the order aggregate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// An order must contain at least one line item.
    #[error("Order has no items")]
    NoItems,

    /// A line item was requested with a zero quantity.
    #[error("Invalid quantity for product {product_id}: quantity must be at least 1")]
    InvalidQuantity { product_id: common::ProductId },

    /// The supplied phone number is not a valid MSISDN.
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    /// The order is delivered or already cancelled.
    #[error("Order cannot be cancelled from {status} state")]
    NotCancellable { status: OrderStatus },

    /// A status transition was requested that the state machine forbids.
    #[error("Invalid order transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// An order and its immutable line-item snapshot.
///
/// Totals are computed once at creation from catalog prices frozen into
/// the items and never silently recomputed. Status mutation goes through
/// the transition methods, which enforce the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Provider,
    pub payer_phone: PhoneNumber,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub tracking_number: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Set once the order's reserved stock has been returned to inventory,
    /// whether by a failed payment or by cancellation. Guards against
    /// restoring the same reservation twice.
    pub stock_released: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new pending order with totals frozen from the given items.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payment_method: Provider,
        payer_phone: PhoneNumber,
        items: Vec<OrderItem>,
        shipping_address: Address,
        billing_address: Address,
        shipping: Money,
        tax_rate_percent: u8,
        discount: Money,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
            });
        }

        let totals = OrderTotals::compute(&items, shipping, tax_rate_percent, discount);
        let now = Utc::now();

        Ok(Self {
            id: OrderId::new(),
            order_number: OrderNumber::generate(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method,
            payer_phone,
            items,
            totals,
            shipping_address,
            billing_address,
            tracking_number: None,
            delivered_at: None,
            stock_released: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Marks the order confirmed after a successful payment.
    ///
    /// Only valid from `Pending`; callers that may race a status update
    /// should check `status.can_confirm()` first.
    pub fn confirm(&mut self) -> Result<(), OrderError> {
        if !self.status.can_confirm() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Confirmed,
            });
        }
        self.status = OrderStatus::Confirmed;
        self.touch();
        Ok(())
    }

    /// Records a successful payment against the order.
    pub fn mark_paid(&mut self) {
        self.payment_status = PaymentStatus::Paid;
        self.touch();
    }

    /// Records a failed payment attempt. The order itself stays where it
    /// is so the customer can retry.
    pub fn mark_payment_failed(&mut self) {
        self.payment_status = PaymentStatus::Failed;
        self.touch();
    }

    /// Cancels the order.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::NotCancellable {
                status: self.status,
            });
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Moves the order to a new fulfilment status (staff operation).
    ///
    /// The pipeline only moves forward; terminal states and backward moves
    /// are rejected. Entering `Delivered` stamps the delivery timestamp
    /// exactly once.
    pub fn set_status(
        &mut self,
        status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<(), OrderError> {
        if status == OrderStatus::Cancelled {
            return self.cancel();
        }
        if !self.status.can_advance_to(status) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        self.status = status;
        if let Some(tracking) = tracking_number {
            self.tracking_number = Some(tracking);
        }
        if status == OrderStatus::Delivered && self.delivered_at.is_none() {
            self.delivered_at = Some(Utc::now());
        }
        self.touch();
        Ok(())
    }

    /// Claims the one-time right to restore this order's stock.
    ///
    /// Returns true on the first call and false thereafter; the caller
    /// restores inventory only when this returns true.
    pub fn release_stock_once(&mut self) -> bool {
        if self.stock_released {
            return false;
        }
        self.stock_released = true;
        self.touch();
        true
    }

    /// Clears the release flag after stock has been re-reserved for a
    /// fresh payment attempt.
    pub fn mark_stock_reserved(&mut self) {
        self.stock_released = false;
        self.touch();
    }

    /// Total quantity across all line items.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
