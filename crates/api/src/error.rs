//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError};
use engine::EngineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Reconciliation engine error.
    Engine(EngineError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Engine(err) => engine_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, String) {
    match &err {
        EngineError::ProductNotFound { .. }
        | EngineError::OrderNotFound { .. }
        | EngineError::PaymentNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        EngineError::InsufficientStock { .. } => (StatusCode::CONFLICT, err.to_string()),
        EngineError::PaymentAlreadyPending { .. }
        | EngineError::OrderNotCancellable { .. }
        | EngineError::OrderNotPayable { .. } => (StatusCode::CONFLICT, err.to_string()),
        // The order exists; only the payment push failed.
        EngineError::GatewayUnavailable { .. } | EngineError::GatewayRejected { .. } => {
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        EngineError::Domain(domain_err) => domain_error_to_response(domain_err, &err),
        EngineError::Store(store_err) => {
            tracing::error!(error = %store_err, "storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage failure".to_string(),
            )
        }
    }
}

fn domain_error_to_response(err: &DomainError, outer: &EngineError) -> (StatusCode, String) {
    match err {
        DomainError::Order(order_err) => match order_err {
            OrderError::InvalidTransition { .. } | OrderError::NotCancellable { .. } => {
                (StatusCode::CONFLICT, outer.to_string())
            }
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPhoneNumber(_) => (StatusCode::BAD_REQUEST, outer.to_string()),
        },
        DomainError::Payment(_) => (StatusCode::CONFLICT, outer.to_string()),
        DomainError::Otp(_) => (StatusCode::BAD_REQUEST, outer.to_string()),
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}
