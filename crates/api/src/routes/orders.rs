//! Order creation, query, cancellation, and status administration.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{OrderId, ProductId};
use domain::{Address, Order, OrderStatus, Payment, PhoneNumber, Provider};
use engine::{NewOrder, NotificationSink, OrderLine, ReconciliationEngine};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store, N: NotificationSink> {
    pub engine: ReconciliationEngine<S, N>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
    pub payment_method: Provider,
    pub phone: String,
    pub shipping_address: Address,
    /// Defaults to the shipping address when omitted.
    pub billing_address: Option<Address>,
}

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub phone: String,
    pub items: Vec<OrderItemResponse>,
    pub totals: TotalsResponse,
    pub tracking_number: Option<String>,
    pub delivered_at: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct TotalsResponse {
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub grand_total_cents: i64,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub provider: String,
    pub amount_cents: i64,
    pub currency: String,
    pub state: String,
    pub transaction_id: Option<String>,
}

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order: OrderResponse,
    pub payment: PaymentResponse,
}

impl OrderResponse {
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            order_number: order.order_number.to_string(),
            status: order.status.to_string(),
            payment_status: order.payment_status.to_string(),
            payment_method: order.payment_method.to_string(),
            phone: order.payer_phone.to_string(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    line_total_cents: item.line_total().cents(),
                })
                .collect(),
            totals: TotalsResponse {
                subtotal_cents: order.totals.subtotal.cents(),
                shipping_cents: order.totals.shipping.cents(),
                tax_cents: order.totals.tax.cents(),
                discount_cents: order.totals.discount.cents(),
                grand_total_cents: order.totals.grand_total.cents(),
            },
            tracking_number: order.tracking_number.clone(),
            delivered_at: order.delivered_at.map(|t| t.to_rfc3339()),
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

impl PaymentResponse {
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            order_id: payment.order_id.to_string(),
            provider: payment.provider.to_string(),
            amount_cents: payment.amount.cents(),
            currency: payment.currency.clone(),
            state: payment.state.to_string(),
            transaction_id: payment.transaction_id.clone(),
        }
    }
}

// -- Handlers --

/// POST /orders — create an order and push its first payment attempt.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let phone = PhoneNumber::new(&req.phone)
        .map_err(|e| ApiError::BadRequest(format!("Invalid phone: {e}")))?;

    let billing_address = req
        .billing_address
        .unwrap_or_else(|| req.shipping_address.clone());

    let request = NewOrder {
        items: req
            .items
            .iter()
            .map(|line| OrderLine {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect(),
        payment_method: req.payment_method,
        phone,
        shipping_address: req.shipping_address,
        billing_address,
    };

    let confirmation = state.engine.create_order(request).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order: OrderResponse::from_order(&confirmation.order),
            payment: PaymentResponse::from_payment(&confirmation.payment),
        }),
    ))
}

/// GET /orders — list orders, optionally filtered by `?status=`.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(OrderStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("Invalid status filter: {e}")))?;

    let orders = state.engine.orders(status).await?;
    Ok(Json(orders.iter().map(OrderResponse::from_order).collect()))
}

/// GET /orders/:id — fetch one order.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.engine.order(order_id).await?;
    Ok(Json(OrderResponse::from_order(&order)))
}

/// POST /orders/:id/cancel — cancel an order and restore its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.engine.cancel_order(order_id).await?;
    Ok(Json(OrderResponse::from_order(&order)))
}

/// PUT /orders/:id/status — move an order along the fulfilment pipeline.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: Store + 'static, N: NotificationSink>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let status = OrderStatus::from_str(&req.status)
        .map_err(|e| ApiError::BadRequest(format!("Invalid status: {e}")))?;

    let order = state
        .engine
        .update_status(order_id, status, req.tracking_number)
        .await?;
    Ok(Json(OrderResponse::from_order(&order)))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
