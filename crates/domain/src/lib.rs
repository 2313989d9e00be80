//! Domain layer for the order-fulfillment system.
//!
//! This crate provides the core domain types:
//! - Order aggregate with its status state machine and frozen totals
//! - Payment record with its own state machine
//! - Value objects (money, addresses, phone numbers, line-item snapshots)
//! - OTP records for phone-based verification flows

pub mod error;
pub mod money;
pub mod order;
pub mod otp;
pub mod payment;

pub use error::DomainError;
pub use money::Money;
pub use order::{
    Address, Order, OrderError, OrderItem, OrderNumber, OrderStatus, OrderTotals, PaymentStatus,
    PhoneNumber,
};
pub use otp::{Otp, OtpError, OtpPurpose};
pub use payment::{Payment, PaymentError, PaymentState, Provider};
