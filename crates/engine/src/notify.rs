//! Fire-and-forget notification sink.
//!
//! Notifications are dispatched on a spawned task after the state
//! transition they describe has been persisted. A slow or failing sink
//! never blocks or fails reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, OrderStatus, Payment};
use tokio::sync::RwLock;

/// Receiver for customer-facing notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    /// A payment settled and the order moved to `Confirmed`.
    async fn order_confirmed(&self, order: Order);

    /// A payment attempt ended in failure or subscriber cancellation.
    async fn payment_failed(&self, order: Order, payment: Payment);

    /// The order moved along the fulfilment pipeline.
    async fn delivery_update(&self, order: Order);

    /// A paid order was cancelled; a refund must be arranged out of band.
    async fn refund_required(&self, order: Order, payment: Option<Payment>);
}

/// Sink that logs each notification through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn order_confirmed(&self, order: Order) {
        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order confirmed");
    }

    async fn payment_failed(&self, order: Order, payment: Payment) {
        tracing::warn!(
            order_id = %order.id,
            payment_id = %payment.id,
            state = %payment.state.as_str(),
            "payment did not settle"
        );
    }

    async fn delivery_update(&self, order: Order) {
        tracing::info!(
            order_id = %order.id,
            status = %order.status,
            tracking = order.tracking_number.as_deref().unwrap_or("-"),
            "delivery update"
        );
    }

    async fn refund_required(&self, order: Order, payment: Option<Payment>) {
        tracing::warn!(
            order_id = %order.id,
            payment_id = payment.as_ref().map(|p| p.id.to_string()).unwrap_or_default(),
            "paid order cancelled, refund required"
        );
    }
}

/// A notification observed by the recording sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    OrderConfirmed(OrderId),
    PaymentFailed(OrderId),
    DeliveryUpdate(OrderId, OrderStatus),
    RefundRequired(OrderId),
}

/// Recording sink for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSink {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every notification received so far.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    /// Waits until at least `count` notifications arrived. Dispatch is
    /// fire-and-forget, so assertions must give spawned tasks a chance to
    /// run.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            {
                let sent = self.sent.read().await;
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn order_confirmed(&self, order: Order) {
        self.sent
            .write()
            .await
            .push(Notification::OrderConfirmed(order.id));
    }

    async fn payment_failed(&self, order: Order, _payment: Payment) {
        self.sent
            .write()
            .await
            .push(Notification::PaymentFailed(order.id));
    }

    async fn delivery_update(&self, order: Order) {
        self.sent
            .write()
            .await
            .push(Notification::DeliveryUpdate(order.id, order.status));
    }

    async fn refund_required(&self, order: Order, _payment: Option<Payment>) {
        self.sent
            .write()
            .await
            .push(Notification::RefundRequired(order.id));
    }
}
