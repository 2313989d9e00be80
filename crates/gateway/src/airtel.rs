//! Airtel Money adapter.
//!
//! Collections use the USSD push flow: the merchant generates the
//! transaction identifier, submits it with the request, and the same
//! identifier comes back in the settlement callback. Token handling
//! mirrors the M-Pesa adapter.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::{PaymentGateway, PushOutcome, PushRequest};

const SANDBOX_BASE_URL: &str = "https://openapiuat.airtel.africa";
const PRODUCTION_BASE_URL: &str = "https://openapi.airtel.africa";

const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Credentials and endpoints for the Airtel Money API.
#[derive(Debug, Clone)]
pub struct AirtelConfig {
    pub client_id: String,
    pub client_secret: String,
    pub country: String,
    pub currency: String,
    pub base_url: String,
}

impl AirtelConfig {
    /// Builds a Kenya-market config pointing at the UAT or production API.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        production: bool,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            country: "KE".to_string(),
            currency: "KES".to_string(),
            base_url: if production {
                PRODUCTION_BASE_URL.to_string()
            } else {
                SANDBOX_BASE_URL.to_string()
            },
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Airtel Money USSD push adapter.
pub struct AirtelGateway {
    config: AirtelConfig,
    http: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl AirtelGateway {
    /// Creates the adapter with a bounded-timeout HTTP client.
    pub fn new(config: AirtelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            config,
            http,
            token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let now = Utc::now();
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref()
                && token.is_fresh(now)
            {
                return Ok(token.token.clone());
            }
        }

        let mut cached = self.token.write().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.token.clone());
        }

        let url = format!("{}/auth/oauth2/token", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "grant_type": "client_credentials",
            }))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Credential(e.to_string()))?;

        let token = parse_token_response(&body, now)?;
        let access = token.token.clone();
        *cached = Some(token);
        Ok(access)
    }
}

#[async_trait]
impl PaymentGateway for AirtelGateway {
    #[tracing::instrument(skip(self), fields(reference = %request.reference))]
    async fn push_payment(&self, request: &PushRequest) -> Result<PushOutcome> {
        let token = self.access_token().await?;
        let transaction_id = generate_transaction_id();

        // Airtel takes MSISDNs without the country prefix it already knows.
        let body = json!({
            "reference": request.reference,
            "subscriber": {
                "country": self.config.country,
                "currency": self.config.currency,
                "msisdn": request.phone.as_str(),
            },
            "transaction": {
                "amount": request.amount.shillings().to_string(),
                "country": self.config.country,
                "currency": self.config.currency,
                "id": transaction_id,
            },
        });

        let url = format!("{}/merchant/v1/payments/", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("X-Country", &self.config.country)
            .header("X-Currency", &self.config.currency)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let raw: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let outcome = parse_push_response(&transaction_id, raw)?;
        tracing::info!(handle = %outcome.handle, "USSD push accepted");
        Ok(outcome)
    }
}

fn generate_transaction_id() -> String {
    format!("TXN-{}", Uuid::new_v4().simple())
}

fn parse_token_response(body: &Value, now: DateTime<Utc>) -> Result<CachedToken> {
    let token = body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::Credential("no access token in response".into()))?;

    let expires_in = match body.get("expires_in") {
        Some(Value::String(s)) => s.parse::<i64>().unwrap_or(3600),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(3600),
        _ => 3600,
    };

    Ok(CachedToken {
        token: token.to_string(),
        expires_at: now + Duration::seconds(expires_in),
    })
}

fn parse_push_response(transaction_id: &str, raw: Value) -> Result<PushOutcome> {
    let accepted = raw
        .pointer("/status/success")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if !accepted {
        let code = raw
            .pointer("/status/code")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let description = raw
            .pointer("/status/message")
            .and_then(Value::as_str)
            .unwrap_or("collection request refused")
            .to_string();
        return Err(GatewayError::Rejected { code, description });
    }

    let provider_ref = raw
        .pointer("/data/transaction/id")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(PushOutcome {
        handle: transaction_id.to_string(),
        provider_ref,
        raw,
    })
}
