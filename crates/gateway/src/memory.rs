//! In-memory gateway test double.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use crate::error::{GatewayError, Result};
use crate::{PaymentGateway, PushOutcome, PushRequest};

/// How the double answers the next push.
#[derive(Debug, Clone, Default)]
pub enum PushMode {
    /// Accept and hand out a fresh handle.
    #[default]
    Accept,

    /// Simulate a transport failure.
    Unavailable,

    /// Simulate an explicit provider rejection.
    Reject { code: String, description: String },
}

/// Recording gateway for engine tests.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    mode: Arc<RwLock<PushMode>>,
    pushes: Arc<RwLock<Vec<PushRequest>>>,
    counter: Arc<AtomicU64>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent pushes fail with [`GatewayError::Unavailable`].
    pub async fn set_unavailable(&self) {
        *self.mode.write().await = PushMode::Unavailable;
    }

    /// Makes subsequent pushes fail with [`GatewayError::Rejected`].
    pub async fn set_reject(&self, code: impl Into<String>, description: impl Into<String>) {
        *self.mode.write().await = PushMode::Reject {
            code: code.into(),
            description: description.into(),
        };
    }

    /// Restores the accepting behavior.
    pub async fn set_accept(&self) {
        *self.mode.write().await = PushMode::Accept;
    }

    /// Returns every push received so far.
    pub async fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.read().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn push_payment(&self, request: &PushRequest) -> Result<PushOutcome> {
        self.pushes.write().await.push(request.clone());

        match self.mode.read().await.clone() {
            PushMode::Accept => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(PushOutcome {
                    handle: format!("test-handle-{n}"),
                    provider_ref: Some(format!("test-ref-{n}")),
                    raw: json!({"accepted": true}),
                })
            }
            PushMode::Unavailable => Err(GatewayError::Unavailable("simulated outage".into())),
            PushMode::Reject { code, description } => {
                Err(GatewayError::Rejected { code, description })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, PhoneNumber};

    fn request() -> PushRequest {
        PushRequest {
            phone: PhoneNumber::new("254712345678").unwrap(),
            amount: Money::from_cents(136_000),
            reference: "ORD-a1b2c3d4".into(),
        }
    }

    #[tokio::test]
    async fn accepts_with_unique_handles() {
        let gateway = InMemoryGateway::new();
        let first = gateway.push_payment(&request()).await.unwrap();
        let second = gateway.push_payment(&request()).await.unwrap();
        assert_ne!(first.handle, second.handle);
        assert_eq!(gateway.pushes().await.len(), 2);
    }

    #[tokio::test]
    async fn simulates_outage_and_rejection() {
        let gateway = InMemoryGateway::new();

        gateway.set_unavailable().await;
        assert!(matches!(
            gateway.push_payment(&request()).await.unwrap_err(),
            GatewayError::Unavailable(_)
        ));

        gateway.set_reject("1032", "Request cancelled by user").await;
        assert!(matches!(
            gateway.push_payment(&request()).await.unwrap_err(),
            GatewayError::Rejected { .. }
        ));

        gateway.set_accept().await;
        assert!(gateway.push_payment(&request()).await.is_ok());
    }
}
