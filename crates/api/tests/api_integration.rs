//! End-to-end tests for the HTTP API over the in-memory store and gateway.

use std::sync::{Arc, OnceLock};

use api::create_app;
use api::routes::orders::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::ProductId;
use domain::Money;
use engine::{InMemoryNotificationSink, Pricing, ReconciliationEngine};
use gateway::{Gateways, InMemoryGateway};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::{Value, json};
use store::{InMemoryStore, Product, ProductStore};
use tower::ServiceExt;

fn metrics_handle() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    store: InMemoryStore,
    gateway: Arc<InMemoryGateway>,
    product_id: ProductId,
}

async fn spawn_app() -> TestApp {
    let store = InMemoryStore::new();
    let gateway = Arc::new(InMemoryGateway::new());
    let sink = Arc::new(InMemoryNotificationSink::new());

    let product_id = ProductId::new();
    store
        .upsert_product(&Product::new(
            product_id,
            "Ceramic mug",
            Money::from_shillings(500),
            10,
        ))
        .await
        .expect("seed product");

    let engine = ReconciliationEngine::new(
        store.clone(),
        Gateways::uniform(gateway.clone()),
        sink,
        Pricing::default(),
    );

    let state = Arc::new(AppState { engine });
    TestApp {
        app: create_app(state, metrics_handle()),
        store,
        gateway,
        product_id,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should complete");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn order_body(product_id: ProductId, quantity: u32) -> Value {
    json!({
        "items": [{ "product_id": product_id, "quantity": quantity }],
        "payment_method": "mpesa",
        "phone": "254712345678",
        "shipping_address": {
            "first_name": "Wanjiru",
            "last_name": "Kamau",
            "address1": "12 Kimathi St",
            "city": "Nairobi",
            "country": "KE",
            "phone": "254712345678"
        }
    })
}

#[tokio::test]
async fn health_check_returns_ok() {
    let test = spawn_app().await;
    let (status, body) = send(&test.app, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_order_returns_201_with_totals_and_pending_payment() {
    let test = spawn_app().await;

    let (status, body) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 2)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(body["order"]["payment_status"], "pending");
    // 2 x 500 = 1000, shipping 200, tax 16% of 1000 = 160
    assert_eq!(body["order"]["totals"]["subtotal_cents"], 100_000);
    assert_eq!(body["order"]["totals"]["shipping_cents"], 20_000);
    assert_eq!(body["order"]["totals"]["tax_cents"], 16_000);
    assert_eq!(body["order"]["totals"]["grand_total_cents"], 136_000);
    assert_eq!(body["payment"]["state"], "pending");
    assert!(body["payment"]["transaction_id"].is_string());

    assert_eq!(test.store.stock_of(test.product_id).await, Some(8));
    assert_eq!(test.gateway.pushes().await.len(), 1);
}

#[tokio::test]
async fn create_order_with_unknown_product_returns_404() {
    let test = spawn_app().await;
    let (status, body) = send(
        &test.app,
        post_json("/orders", order_body(ProductId::new(), 1)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn create_order_beyond_stock_returns_409() {
    let test = spawn_app().await;
    let (status, _) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 11)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_order_with_invalid_phone_returns_400() {
    let test = spawn_app().await;
    let mut body = order_body(test.product_id, 1);
    body["phone"] = json!("not-a-phone");
    let (status, _) = send(&test.app, post_json("/orders", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_order_roundtrip_and_bad_id() {
    let test = spawn_app().await;
    let (_, created) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 1)),
    )
    .await;
    let id = created["order"]["id"].as_str().expect("order id").to_owned();

    let (status, fetched) = send(&test.app, get_req(&format!("/orders/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id.as_str());

    let (status, _) = send(&test.app, get_req("/orders/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(&test.app, get_req(&format!("/orders/{missing}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_orders_filters_by_status() {
    let test = spawn_app().await;
    send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 1)),
    )
    .await;

    let (status, listed) = send(&test.app, get_req("/orders?status=pending")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let (status, listed) = send(&test.app, get_req("/orders?status=shipped")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    let (status, _) = send(&test.app, get_req("/orders?status=bogus")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_order_restores_stock() {
    let test = spawn_app().await;
    let (_, created) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 3)),
    )
    .await;
    let id = created["order"]["id"].as_str().expect("order id").to_owned();
    assert_eq!(test.store.stock_of(test.product_id).await, Some(7));

    let (status, cancelled) = send(
        &test.app,
        post_json(&format!("/orders/{id}/cancel"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(test.store.stock_of(test.product_id).await, Some(10));

    // A second cancel hits the terminal-state guard.
    let (status, _) = send(
        &test.app,
        post_json(&format!("/orders/{id}/cancel"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn mpesa_callback_settles_order_and_always_acknowledges() {
    let test = spawn_app().await;
    let (_, created) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 2)),
    )
    .await;
    let id = created["order"]["id"].as_str().expect("order id").to_owned();
    let handle = created["payment"]["transaction_id"]
        .as_str()
        .expect("transaction id")
        .to_owned();

    let callback = json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": handle,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully."
            }
        }
    });
    let (status, body) = send(&test.app, post_json("/payments/mpesa/callback", callback)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (_, order) = send(&test.app, get_req(&format!("/orders/{id}"))).await;
    assert_eq!(order["status"], "confirmed");
    assert_eq!(order["payment_status"], "paid");

    let (status, payment) = send(&test.app, get_req(&format!("/payments/{handle}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["state"], "success");
}

#[tokio::test]
async fn malformed_and_unmatched_callbacks_still_return_200() {
    let test = spawn_app().await;

    let (status, body) = send(
        &test.app,
        post_json("/payments/mpesa/callback", json!({"nonsense": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let unmatched = json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": "ws_CO_never_issued",
                "ResultCode": 0
            }
        }
    });
    let (status, body) = send(&test.app, post_json("/payments/mpesa/callback", unmatched)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn failed_callback_releases_stock_and_allows_retry() {
    let test = spawn_app().await;
    let (_, created) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 4)),
    )
    .await;
    let order_id = created["order"]["id"].as_str().expect("order id").to_owned();
    let handle = created["payment"]["transaction_id"]
        .as_str()
        .expect("transaction id")
        .to_owned();
    assert_eq!(test.store.stock_of(test.product_id).await, Some(6));

    let callback = json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": handle,
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    });
    send(&test.app, post_json("/payments/mpesa/callback", callback)).await;
    assert_eq!(test.store.stock_of(test.product_id).await, Some(10));

    // Retry re-reserves the stock and issues a fresh pending payment.
    let (status, retried) = send(
        &test.app,
        post_json("/payments", json!({ "order_id": order_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(retried["state"], "pending");
    assert_eq!(test.store.stock_of(test.product_id).await, Some(6));
}

#[tokio::test]
async fn initiate_payment_with_pending_attempt_returns_409() {
    let test = spawn_app().await;
    let (_, created) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 1)),
    )
    .await;
    let order_id = created["order"]["id"].as_str().expect("order id").to_owned();

    let (status, _) = send(
        &test.app,
        post_json("/payments", json!({ "order_id": order_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn update_status_moves_order_along_pipeline() {
    let test = spawn_app().await;
    let (_, created) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 1)),
    )
    .await;
    let id = created["order"]["id"].as_str().expect("order id").to_owned();
    let handle = created["payment"]["transaction_id"]
        .as_str()
        .expect("transaction id")
        .to_owned();

    let callback = json!({
        "Body": { "stkCallback": { "CheckoutRequestID": handle, "ResultCode": 0 } }
    });
    send(&test.app, post_json("/payments/mpesa/callback", callback)).await;

    for (status_name, tracking) in [
        ("processing", None),
        ("shipped", Some("KE-TRACK-001")),
        ("delivered", None),
    ] {
        let mut body = json!({ "status": status_name });
        if let Some(t) = tracking {
            body["tracking_number"] = json!(t);
        }
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/orders/{id}/status"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build");
        let (status, updated) = send(&test.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], status_name);
    }

    let (_, order) = send(&test.app, get_req(&format!("/orders/{id}"))).await;
    assert_eq!(order["tracking_number"], "KE-TRACK-001");
    assert!(order["delivered_at"].is_string());
}

#[tokio::test]
async fn gateway_outage_returns_502_but_persists_order() {
    let test = spawn_app().await;
    test.gateway.set_unavailable().await;

    let (status, _) = send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 2)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    // The order exists with its stock still reserved for the retry.
    let (_, listed) = send(&test.app, get_req("/orders")).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["payment_status"], "failed");
    assert_eq!(test.store.stock_of(test.product_id).await, Some(8));
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let test = spawn_app().await;
    send(
        &test.app,
        post_json("/orders", order_body(test.product_id, 1)),
    )
    .await;

    let response = test
        .app
        .clone()
        .oneshot(get_req("/metrics"))
        .await
        .expect("request should complete");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("orders_created_total"));
}
