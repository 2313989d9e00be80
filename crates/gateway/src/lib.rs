//! Payment-provider adapters.
//!
//! Each adapter normalizes one provider's push-payment API into
//! [`PushOutcome`]: an opaque transaction handle for callback correlation,
//! an optional provider reference, and the raw response kept for audit.
//! Provider request and response shapes never leak past this crate.

pub mod airtel;
pub mod error;
pub mod memory;
pub mod mpesa;

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, PhoneNumber, Provider};
use serde_json::Value;

pub use airtel::{AirtelConfig, AirtelGateway};
pub use error::{GatewayError, Result};
pub use memory::{InMemoryGateway, PushMode};
pub use mpesa::{MpesaConfig, MpesaGateway};

/// A push-payment request to a mobile-money provider.
#[derive(Debug, Clone)]
pub struct PushRequest {
    /// Subscriber to prompt for payment.
    pub phone: PhoneNumber,

    /// Amount to collect.
    pub amount: Money,

    /// Merchant-side reference shown on the subscriber's statement,
    /// typically the order number.
    pub reference: String,
}

/// The normalized result of an accepted push.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// The provider's transaction handle. Later callbacks carry this same
    /// value, so it is the correlation key.
    pub handle: String,

    /// Secondary provider reference, when the provider issues one.
    pub provider_ref: Option<String>,

    /// The provider's response body, verbatim, for audit.
    pub raw: Value,
}

/// A mobile-money provider adapter.
///
/// `push_payment` asks the provider to prompt the subscriber on their
/// handset. Acceptance means the prompt was queued; settlement arrives
/// later through the provider's callback.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn push_payment(&self, request: &PushRequest) -> Result<PushOutcome>;
}

/// Routes push requests to the adapter for a provider.
#[derive(Clone)]
pub struct Gateways {
    mpesa: Arc<dyn PaymentGateway>,
    airtel: Arc<dyn PaymentGateway>,
}

impl Gateways {
    /// Creates a router over the two provider adapters.
    pub fn new(mpesa: Arc<dyn PaymentGateway>, airtel: Arc<dyn PaymentGateway>) -> Self {
        Self { mpesa, airtel }
    }

    /// Convenience constructor that uses one adapter for every provider
    /// (test doubles).
    pub fn uniform(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            mpesa: gateway.clone(),
            airtel: gateway,
        }
    }

    /// Pushes a payment through the adapter for `provider`.
    pub async fn push_payment(
        &self,
        provider: Provider,
        request: &PushRequest,
    ) -> Result<PushOutcome> {
        match provider {
            Provider::Mpesa => self.mpesa.push_payment(request).await,
            Provider::Airtel => self.airtel.push_payment(request).await,
        }
    }
}
