//! Payment records and their state machine.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;
use crate::order::PhoneNumber;

/// A supported mobile-money provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Mpesa,
    Airtel,
}

impl Provider {
    /// Returns the provider name as stored and exchanged over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Mpesa => "mpesa",
            Provider::Airtel => "airtel",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mpesa" => Ok(Provider::Mpesa),
            "airtel" => Ok(Provider::Airtel),
            other => Err(format!("unknown payment provider: {other}")),
        }
    }
}

/// The state of one payment attempt.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Success
///           ├──► Failed
///           └──► Cancelled
/// ```
///
/// All three outcome states are terminal; a retried payment creates a
/// new record rather than reopening a settled one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    /// Push sent (or about to be sent), awaiting the provider callback.
    #[default]
    Pending,

    /// Provider confirmed the payment (terminal state).
    Success,

    /// Provider reported failure (terminal state).
    Failed,

    /// Subscriber declined or the push timed out (terminal state).
    Cancelled,
}

impl PaymentState {
    /// Returns true if no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentState::Pending)
    }

    /// Returns the state name as stored and exchanged over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Success => "success",
            PaymentState::Failed => "failed",
            PaymentState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentState::Pending),
            "success" => Ok(PaymentState::Success),
            "failed" => Ok(PaymentState::Failed),
            "cancelled" => Ok(PaymentState::Cancelled),
            other => Err(format!("unknown payment state: {other}")),
        }
    }
}

/// Errors raised by the payment record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    /// A transition was attempted on an already settled record.
    #[error("Payment already settled as {state}")]
    AlreadySettled { state: PaymentState },
}

/// One payment attempt against an order.
///
/// The provider transaction handle (`transaction_id`) is assigned when the
/// provider acknowledges the push and is the correlation key for the
/// asynchronous callback. The raw provider response is kept opaque for
/// audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub provider: Provider,
    pub phone: PhoneNumber,
    pub amount: Money,
    pub currency: String,
    pub state: PaymentState,
    pub transaction_id: Option<String>,
    pub provider_ref: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a new pending payment attempt in KES.
    pub fn new(order_id: OrderId, provider: Provider, phone: PhoneNumber, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            provider,
            phone,
            amount,
            currency: "KES".to_string(),
            state: PaymentState::Pending,
            transaction_id: None,
            provider_ref: None,
            provider_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records the provider's acknowledgement of the push.
    pub fn attach_provider_handle(
        &mut self,
        transaction_id: impl Into<String>,
        provider_ref: Option<String>,
        raw_response: serde_json::Value,
    ) {
        self.transaction_id = Some(transaction_id.into());
        self.provider_ref = provider_ref;
        self.provider_response = Some(raw_response);
        self.touch();
    }

    /// Transitions the payment to `Success`.
    pub fn succeed(&mut self) -> Result<(), PaymentError> {
        self.transition(PaymentState::Success)
    }

    /// Transitions the payment to `Failed`.
    pub fn fail(&mut self) -> Result<(), PaymentError> {
        self.transition(PaymentState::Failed)
    }

    /// Transitions the payment to `Cancelled`.
    pub fn cancel(&mut self) -> Result<(), PaymentError> {
        self.transition(PaymentState::Cancelled)
    }

    fn transition(&mut self, target: PaymentState) -> Result<(), PaymentError> {
        if self.state.is_terminal() {
            return Err(PaymentError::AlreadySettled { state: self.state });
        }
        self.state = target;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
