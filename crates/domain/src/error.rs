//! Domain error types.

use thiserror::Error;

use crate::order::OrderError;
use crate::otp::OtpError;
use crate::payment::PaymentError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An error occurred in the payment record.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// An error occurred verifying an OTP.
    #[error("OTP error: {0}")]
    Otp(#[from] OtpError),
}
