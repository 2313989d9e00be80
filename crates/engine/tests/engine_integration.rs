//! End-to-end reconciliation scenarios against the in-memory stores.

use std::sync::Arc;

use common::ProductId;
use domain::{Address, Money, OrderStatus, PaymentStatus, PhoneNumber, Provider};
use engine::{
    EngineError, InMemoryNotificationSink, NewOrder, OrderLine, Pricing, ReconciliationEngine,
};
use gateway::{Gateways, InMemoryGateway};
use serde_json::json;
use store::{InMemoryStore, Product, ProductStore};

type TestEngine = ReconciliationEngine<InMemoryStore, InMemoryNotificationSink>;

fn address() -> Address {
    Address {
        first_name: "Wanjiku".into(),
        last_name: "Kamau".into(),
        address1: "12 Riverside Drive".into(),
        address2: None,
        city: "Nairobi".into(),
        country: "KE".into(),
        postal_code: Some("00100".into()),
        phone: "254712345678".into(),
    }
}

async fn setup() -> (TestEngine, InMemoryStore, Arc<InMemoryGateway>) {
    let store = InMemoryStore::new();
    let gateway = Arc::new(InMemoryGateway::new());
    let sink = Arc::new(InMemoryNotificationSink::new());
    let engine = ReconciliationEngine::new(
        store.clone(),
        Gateways::uniform(gateway.clone()),
        sink,
        Pricing::default(),
    );
    (engine, store, gateway)
}

async fn seed(store: &InMemoryStore, stock: i64) -> Product {
    let product = Product::new(
        ProductId::new(),
        "Produce Box",
        Money::from_shillings(1000),
        stock,
    );
    store.upsert_product(&product).await.unwrap();
    product
}

fn request(product: &Product, quantity: u32, provider: Provider) -> NewOrder {
    NewOrder {
        items: vec![OrderLine {
            product_id: product.id,
            quantity,
        }],
        payment_method: provider,
        phone: PhoneNumber::new("254712345678").unwrap(),
        shipping_address: address(),
        billing_address: address(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_for_scarce_stock_leave_one_winner() {
    let (engine, store, _) = setup().await;
    let product = seed(&store, 5).await;

    let (a, b) = tokio::join!(
        engine.create_order(request(&product, 3, Provider::Mpesa)),
        engine.create_order(request(&product, 3, Provider::Mpesa))
    );

    let (won, lost) = match (&a, &b) {
        (Ok(_), Err(_)) => (a.unwrap(), b.unwrap_err()),
        (Err(_), Ok(_)) => (b.unwrap(), a.unwrap_err()),
        other => panic!("expected exactly one winner, got {other:?}"),
    };

    // The loser fails either at the advisory check or at the ledger
    // itself; both report the shortage, and neither holds any stock.
    assert!(matches!(lost, EngineError::InsufficientStock { .. }));
    assert_eq!(won.order.status, OrderStatus::Pending);
    assert_eq!(store.stock_of(product.id).await, Some(2));
}

#[tokio::test]
async fn lost_reservation_rolls_back_and_cancels_the_order() {
    let (engine, store, gateway) = setup().await;
    let product = seed(&store, 5).await;

    // Two lines of the same product each pass the advisory stock check,
    // but their combined quantity cannot be reserved: the second line
    // loses at the ledger, the first line's hold is rolled back, and the
    // persisted order is cancelled before any payment push.
    let request = NewOrder {
        items: vec![
            OrderLine {
                product_id: product.id,
                quantity: 3,
            },
            OrderLine {
                product_id: product.id,
                quantity: 3,
            },
        ],
        payment_method: Provider::Mpesa,
        phone: PhoneNumber::new("254712345678").unwrap(),
        shipping_address: address(),
        billing_address: address(),
    };

    let err = engine.create_order(request).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { requested: 3, .. }));
    assert_eq!(store.stock_of(product.id).await, Some(5));

    let cancelled = engine.orders(Some(OrderStatus::Cancelled)).await.unwrap();
    assert_eq!(cancelled.len(), 1);
    assert!(cancelled[0].stock_released);
    assert!(gateway.pushes().await.is_empty());
}

#[tokio::test]
async fn full_lifecycle_order_to_delivery() {
    let (engine, store, _) = setup().await;
    let product = seed(&store, 10).await;

    let confirmation = engine
        .create_order(request(&product, 2, Provider::Mpesa))
        .await
        .unwrap();
    let order_id = confirmation.order.id;
    let handle = confirmation.payment.transaction_id.unwrap();

    let settled = json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": handle,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully."
            }
        }
    });
    engine.handle_callback(Provider::Mpesa, &settled).await.unwrap();

    engine
        .update_status(order_id, OrderStatus::Processing, None)
        .await
        .unwrap();
    engine
        .update_status(order_id, OrderStatus::Shipped, Some("KE-TRACK-9".into()))
        .await
        .unwrap();
    let order = engine
        .update_status(order_id, OrderStatus::Delivered, None)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.delivered_at.is_some());
    assert_eq!(store.stock_of(product.id).await, Some(8));

    // Terminal: no further movement, no cancellation.
    assert!(
        engine
            .update_status(order_id, OrderStatus::Processing, None)
            .await
            .is_err()
    );
    assert!(matches!(
        engine.cancel_order(order_id).await.unwrap_err(),
        EngineError::OrderNotCancellable { .. }
    ));
}

#[tokio::test]
async fn airtel_lifecycle_with_failure_then_retry() {
    let (engine, store, _) = setup().await;
    let product = seed(&store, 4).await;

    let confirmation = engine
        .create_order(request(&product, 2, Provider::Airtel))
        .await
        .unwrap();
    let order_id = confirmation.order.id;
    let first_handle = confirmation.payment.transaction_id.unwrap();
    assert_eq!(store.stock_of(product.id).await, Some(2));

    let failed = json!({"transaction": {"id": first_handle, "status_code": "TF"}});
    engine.handle_callback(Provider::Airtel, &failed).await.unwrap();
    assert_eq!(store.stock_of(product.id).await, Some(4));

    let retry = engine.initiate_payment(order_id, None, None).await.unwrap();
    let second_handle = retry.transaction_id.unwrap();
    assert_ne!(second_handle, first_handle);
    assert_eq!(store.stock_of(product.id).await, Some(2));

    let settled = json!({"transaction": {"id": second_handle, "status_code": "TS"}});
    engine.handle_callback(Provider::Airtel, &settled).await.unwrap();

    let order = engine.order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(store.stock_of(product.id).await, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_callback_delivery_settles_once() {
    let (engine, store, _) = setup().await;
    let product = seed(&store, 5).await;

    let confirmation = engine
        .create_order(request(&product, 2, Provider::Mpesa))
        .await
        .unwrap();
    let handle = confirmation.payment.transaction_id.unwrap();

    let failed = json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": handle,
                "ResultCode": 1,
                "ResultDesc": "The balance is insufficient for the transaction"
            }
        }
    });

    // The provider may deliver the same settlement more than once.
    let (a, b) = tokio::join!(
        engine.handle_callback(Provider::Mpesa, &failed),
        engine.handle_callback(Provider::Mpesa, &failed)
    );
    a.unwrap();
    b.unwrap();

    // Restoration happened exactly once: stock is back to 5, not 7.
    assert_eq!(store.stock_of(product.id).await, Some(5));
}
