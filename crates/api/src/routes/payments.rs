//! Payment initiation, lookup, and provider callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::{PhoneNumber, Provider};
use engine::{CallbackOutcome, NotificationSink};
use serde::Deserialize;
use serde_json::Value;
use store::Store;

use crate::error::ApiError;
use crate::routes::orders::{AppState, PaymentResponse};

#[derive(Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: OrderId,
    /// Defaults to the order's original payment method.
    pub provider: Option<Provider>,
    /// Defaults to the order's payer phone.
    pub phone: Option<String>,
}

/// POST /payments — start a fresh payment attempt for an order.
#[tracing::instrument(skip(state, req))]
pub async fn initiate<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<(axum::http::StatusCode, Json<PaymentResponse>), ApiError> {
    let phone = req
        .phone
        .as_deref()
        .map(PhoneNumber::new)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("Invalid phone: {e}")))?;

    let payment = state
        .engine
        .initiate_payment(req.order_id, req.provider, phone)
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(PaymentResponse::from_payment(&payment)),
    ))
}

/// GET /payments/:transaction_id — fetch a payment by provider handle.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state.engine.payment_by_transaction(&transaction_id).await?;
    Ok(Json(PaymentResponse::from_payment(&payment)))
}

/// POST /payments/mpesa/callback — M-Pesa settlement webhook.
///
/// Always acknowledges with 200 so the provider does not retry; the
/// outcome is only logged.
#[tracing::instrument(skip(state, payload))]
pub async fn mpesa_callback<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    acknowledge(&state, Provider::Mpesa, &payload).await
}

/// POST /payments/airtel/callback — Airtel Money settlement webhook.
#[tracing::instrument(skip(state, payload))]
pub async fn airtel_callback<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    acknowledge(&state, Provider::Airtel, &payload).await
}

async fn acknowledge<S: Store + 'static, N: NotificationSink>(
    state: &AppState<S, N>,
    provider: Provider,
    payload: &Value,
) -> Json<Value> {
    match state.engine.handle_callback(provider, payload).await {
        Ok(outcome) => match outcome {
            CallbackOutcome::Applied => {
                tracing::info!(%provider, "callback applied");
            }
            CallbackOutcome::AlreadySettled => {
                tracing::info!(%provider, "callback replay ignored");
            }
            CallbackOutcome::Unmatched => {
                tracing::warn!(%provider, "callback matched no payment");
            }
            CallbackOutcome::Malformed => {
                tracing::warn!(%provider, "callback payload not recognised");
            }
        },
        Err(err) => {
            tracing::error!(%provider, error = %err, "callback processing failed");
        }
    }

    Json(serde_json::json!({ "status": "success" }))
}
