//! M-Pesa (Safaricom Daraja) adapter.
//!
//! Push payments use the STK push flow: the API queues a PIN prompt on the
//! subscriber's handset and answers with a `CheckoutRequestID`, which is the
//! handle later callbacks carry. OAuth tokens are cached and refreshed
//! shortly before they expire.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::error::{GatewayError, Result};
use crate::{PaymentGateway, PushOutcome, PushRequest};

const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

/// How long before token expiry a refresh is forced.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Credentials and endpoints for the Daraja API.
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub passkey: String,
    pub shortcode: String,
    pub callback_url: String,
    pub base_url: String,
}

impl MpesaConfig {
    /// Builds a config pointing at the sandbox or production API.
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        passkey: impl Into<String>,
        shortcode: impl Into<String>,
        callback_url: impl Into<String>,
        production: bool,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            passkey: passkey.into(),
            shortcode: shortcode.into(),
            callback_url: callback_url.into(),
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

/// Daraja STK push adapter.
pub struct MpesaGateway {
    config: MpesaConfig,
    http: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl MpesaGateway {
    /// Creates the adapter with a bounded-timeout HTTP client.
    pub fn new(config: MpesaConfig) -> Result<Self> {
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
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.token.clone());
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
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
impl PaymentGateway for MpesaGateway {
    #[tracing::instrument(skip(self), fields(reference = %request.reference))]
    async fn push_payment(&self, request: &PushRequest) -> Result<PushOutcome> {
        let token = self.access_token().await?;

        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = stk_password(&self.config.shortcode, &self.config.passkey, &timestamp);

        // Daraja takes whole shillings.
        let body = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": request.amount.shillings().to_string(),
            "PartyA": request.phone.as_str(),
            "PartyB": self.config.shortcode,
            "PhoneNumber": request.phone.as_str(),
            "CallBackURL": self.config.callback_url,
            "AccountReference": request.reference,
            "TransactionDesc": "Order payment",
        });

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        let raw: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let outcome = parse_stk_response(status.as_u16(), raw)?;
        tracing::info!(handle = %outcome.handle, "STK push accepted");
        Ok(outcome)
    }
}

fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{shortcode}{passkey}{timestamp}"))
}

fn parse_token_response(body: &Value, now: DateTime<Utc>) -> Result<CachedToken> {
    let token = body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::Credential("no access token in response".into()))?;

    // Daraja serializes expires_in as a string of seconds.
    let expires_in = body
        .get("expires_in")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(3600);

    Ok(CachedToken {
        token: token.to_string(),
        expires_at: now + Duration::seconds(expires_in),
    })
}

fn parse_stk_response(http_status: u16, raw: Value) -> Result<PushOutcome> {
    if http_status != 200 {
        let code = raw
            .get("errorCode")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let description = raw
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or("STK push request refused")
            .to_string();
        return Err(GatewayError::Rejected { code, description });
    }

    let response_code = raw.get("ResponseCode").and_then(Value::as_str).unwrap_or("");
    if response_code != "0" {
        let description = raw
            .get("ResponseDescription")
            .and_then(Value::as_str)
            .unwrap_or("STK push not accepted")
            .to_string();
        return Err(GatewayError::Rejected {
            code: response_code.to_string(),
            description,
        });
    }

    let handle = raw
        .get("CheckoutRequestID")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            GatewayError::Unavailable("accepted STK push without CheckoutRequestID".into())
        })?
        .to_string();

    let provider_ref = raw
        .get("MerchantRequestID")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(PushOutcome {
        handle,
        provider_ref,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_base64_of_shortcode_passkey_timestamp() {
        let password = stk_password("174379", "key", "20260824120000");
        let decoded = BASE64.decode(password).unwrap();
        assert_eq!(decoded, b"174379key20260824120000");
    }

    #[test]
    fn token_response_parses_string_expiry() {
        let now = Utc::now();
        let token = parse_token_response(
            &json!({"access_token": "abc123", "expires_in": "3599"}),
            now,
        )
        .unwrap();
        assert_eq!(token.token, "abc123");
        assert_eq!(token.expires_at, now + Duration::seconds(3599));
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::seconds(3599 - 30)));
    }

    #[test]
    fn token_response_without_token_is_credential_error() {
        let err = parse_token_response(&json!({"expires_in": "3599"}), Utc::now()).unwrap_err();
        assert!(matches!(err, GatewayError::Credential(_)));
    }

    #[test]
    fn accepted_push_yields_checkout_request_id() {
        let raw = json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        });

        let outcome = parse_stk_response(200, raw).unwrap();
        assert_eq!(outcome.handle, "ws_CO_191220191020363925");
        assert_eq!(outcome.provider_ref.as_deref(), Some("29115-34620561-1"));
    }

    #[test]
    fn nonzero_response_code_is_rejection() {
        let raw = json!({
            "ResponseCode": "1",
            "ResponseDescription": "Insufficient balance on business account"
        });

        let err = parse_stk_response(200, raw).unwrap_err();
        match err {
            GatewayError::Rejected { code, description } => {
                assert_eq!(code, "1");
                assert!(description.contains("Insufficient balance"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn http_error_status_is_rejection_with_error_body() {
        let raw = json!({
            "errorCode": "500.001.1001",
            "errorMessage": "Unable to lock subscriber"
        });

        let err = parse_stk_response(500, raw).unwrap_err();
        match err {
            GatewayError::Rejected { code, .. } => assert_eq!(code, "500.001.1001"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
