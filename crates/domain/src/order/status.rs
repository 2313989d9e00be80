//! Order status state machines.

use serde::{Deserialize, Serialize};

/// The fulfilment status of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///    │            │             │             │
///    └────────────┴─────────────┴─────────────┴──► Cancelled
/// ```
///
/// `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order placed, payment not yet confirmed.
    #[default]
    Pending,

    /// Payment confirmed, order accepted.
    Confirmed,

    /// Order is being prepared and packed.
    Processing,

    /// Order handed to the carrier.
    Shipped,

    /// Order delivered to the customer (terminal state).
    Delivered,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order can be confirmed from this state.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled from this state.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns true when `target` lies further along the fulfilment
    /// pipeline. The pipeline only moves forward; `Cancelled` sits outside
    /// it and is reached through cancellation instead.
    pub fn can_advance_to(&self, target: OrderStatus) -> bool {
        fn position(status: OrderStatus) -> Option<u8> {
            match status {
                OrderStatus::Pending => Some(0),
                OrderStatus::Confirmed => Some(1),
                OrderStatus::Processing => Some(2),
                OrderStatus::Shipped => Some(3),
                OrderStatus::Delivered => Some(4),
                OrderStatus::Cancelled => None,
            }
        }
        match (position(*self), position(target)) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    /// Returns the status name as stored and exchanged over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// The payment status of an order, tracked separately from fulfilment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// No successful payment yet.
    #[default]
    Pending,

    /// A payment attempt succeeded.
    Paid,

    /// The latest payment attempt failed; the customer may retry.
    Failed,

    /// Payment was refunded after completion.
    Refunded,
}

impl PaymentStatus {
    /// Returns the status name as stored and exchanged over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}
