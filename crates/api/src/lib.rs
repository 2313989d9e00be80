//! HTTP API for the order fulfilment service.
//!
//! Exposes order management, payment initiation, and the provider
//! settlement webhooks over axum, plus health and Prometheus metrics
//! endpoints.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use engine::NotificationSink;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use routes::orders::AppState;

/// Builds the application router with all routes and middleware.
pub fn create_app<S: Store + 'static, N: NotificationSink>(
    state: Arc<AppState<S, N>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create).get(routes::orders::list),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/orders/{id}/status", put(routes::orders::update_status))
        .route("/payments", post(routes::payments::initiate))
        .route(
            "/payments/mpesa/callback",
            post(routes::payments::mpesa_callback),
        )
        .route(
            "/payments/airtel/callback",
            post(routes::payments::airtel_callback),
        )
        .route(
            "/payments/{transaction_id}",
            get(routes::payments::get),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
