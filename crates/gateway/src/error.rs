//! Gateway error types.

use thiserror::Error;

/// Errors raised by payment-provider adapters.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider could not be reached or answered with a transport-level
    /// failure. The attempt may be retried later.
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    /// The provider received the request and explicitly refused it.
    #[error("Payment provider rejected the request ({code}): {description}")]
    Rejected { code: String, description: String },

    /// Credential acquisition failed.
    #[error("Provider credential error: {0}")]
    Credential(String),

    /// A provider response could not be decoded.
    #[error("Provider response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Convenience type alias for gateway results.
pub type Result<T> = std::result::Result<T, GatewayError>;
