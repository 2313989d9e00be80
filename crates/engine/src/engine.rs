//! The reconciliation engine.
//!
//! Orchestrates the three sources of truth the system must keep agreeing:
//! order state, the inventory ledger, and the provider's view of a payment
//! attempt. Every operation either completes its step order or compensates
//! the steps already taken.

use std::sync::Arc;

use common::{OrderId, ProductId};
use domain::{
    Address, Money, Order, OrderItem, OrderStatus, Payment, PaymentStatus, PhoneNumber, Provider,
};
use gateway::{GatewayError, Gateways, PushRequest};
use serde_json::{Value, json};
use store::{Store, StoreError};

use crate::callback::{self, CallbackOutcome, PaymentResolution};
use crate::error::{EngineError, Result};
use crate::notify::NotificationSink;

/// One requested order line, by catalog reference.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A request to create an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub items: Vec<OrderLine>,
    pub payment_method: Provider,
    pub phone: PhoneNumber,
    pub shipping_address: Address,
    pub billing_address: Address,
}

/// Merchant-wide pricing applied to every order at creation.
#[derive(Debug, Clone)]
pub struct Pricing {
    pub shipping: Money,
    pub tax_rate_percent: u8,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            shipping: Money::from_shillings(200),
            tax_rate_percent: 16,
        }
    }
}

/// A created order together with its initial payment attempt.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order: Order,
    pub payment: Payment,
}

/// Drives order creation, payment settlement, and cancellation against
/// the stores and provider adapters.
pub struct ReconciliationEngine<S, N> {
    store: S,
    gateways: Gateways,
    notifier: Arc<N>,
    pricing: Pricing,
}

impl<S, N> ReconciliationEngine<S, N>
where
    S: Store,
    N: NotificationSink,
{
    /// Creates a new engine.
    pub fn new(store: S, gateways: Gateways, notifier: Arc<N>, pricing: Pricing) -> Self {
        Self {
            store,
            gateways,
            notifier,
            pricing,
        }
    }

    /// Creates an order: snapshot the catalog into frozen line items,
    /// persist the pending order, reserve stock, and push the payment.
    ///
    /// A reservation lost to a concurrent order rolls back the lines
    /// already reserved and cancels the order record. A gateway failure
    /// leaves the order persisted with its stock still reserved, so the
    /// client can retry the payment without re-entering the oversell race.
    #[tracing::instrument(skip(self, request), fields(provider = %request.payment_method))]
    pub async fn create_order(&self, request: NewOrder) -> Result<OrderConfirmation> {
        metrics::counter!("order_create_attempts_total").increment(1);
        let start = std::time::Instant::now();

        // 1. Validate lines against the live catalog and freeze the
        //    snapshot. The stock check here is advisory; the reservation
        //    below is what holds.
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = self
                .store
                .get_product(line.product_id)
                .await?
                .ok_or(EngineError::ProductNotFound {
                    product_id: line.product_id,
                })?;
            if product.stock < i64::from(line.quantity) {
                return Err(EngineError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: product.stock,
                });
            }
            items.push(OrderItem::new(
                product.id,
                product.name,
                line.quantity,
                product.unit_price,
            ));
        }

        // 2. Freeze totals and persist the pending order with its items.
        let mut order = Order::new(
            request.payment_method,
            request.phone.clone(),
            items,
            request.shipping_address,
            request.billing_address,
            self.pricing.shipping,
            self.pricing.tax_rate_percent,
            Money::zero(),
        )?;
        self.store.insert_order(&order).await?;

        // 3. Reserve stock line by line. Losing the race to another order
        //    compensates and cancels.
        if let Err(e) = self.reserve_items(&order.items).await {
            order.cancel()?;
            // Nothing is held; there is no stock left to release later.
            order.release_stock_once();
            self.store.update_order(&order).await?;
            tracing::warn!(order_id = %order.id, error = %e, "order cancelled during reservation");
            return Err(e);
        }

        // 4. Push the payment and record the attempt.
        let payment = self
            .push_and_record(&mut order, request.payment_method, request.phone)
            .await?;

        metrics::histogram!("order_creation_duration_seconds").record(start.elapsed().as_secs_f64());
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");

        Ok(OrderConfirmation { order, payment })
    }

    /// Starts a fresh payment attempt for an existing order.
    ///
    /// Rejected when the order is paid or terminal, or when a previous
    /// attempt is still awaiting its callback. If an earlier failure
    /// already returned the stock, it is re-reserved first.
    #[tracing::instrument(skip(self, phone))]
    pub async fn initiate_payment(
        &self,
        order_id: OrderId,
        provider: Option<Provider>,
        phone: Option<PhoneNumber>,
    ) -> Result<Payment> {
        let mut order = self.load_order(order_id).await?;

        if order.status.is_terminal() || order.payment_status == PaymentStatus::Paid {
            return Err(EngineError::OrderNotPayable { order_id });
        }
        if self
            .store
            .find_pending_payment_for_order(order_id)
            .await?
            .is_some()
        {
            return Err(EngineError::PaymentAlreadyPending { order_id });
        }

        if order.stock_released {
            self.reserve_items(&order.items).await?;
            order.mark_stock_reserved();
            self.store.update_order(&order).await?;
        }

        let provider = provider.unwrap_or(order.payment_method);
        let phone = phone.unwrap_or_else(|| order.payer_phone.clone());
        self.push_and_record(&mut order, provider, phone).await
    }

    /// Applies a provider settlement callback.
    ///
    /// Idempotent: a replayed or unmatched callback changes nothing, and
    /// the outcome is never an error towards the provider.
    #[tracing::instrument(skip(self, payload))]
    pub async fn handle_callback(
        &self,
        provider: Provider,
        payload: &Value,
    ) -> Result<CallbackOutcome> {
        let event = match provider {
            Provider::Mpesa => callback::parse_mpesa_callback(payload),
            Provider::Airtel => callback::parse_airtel_callback(payload),
        };

        let Some(event) = event else {
            metrics::counter!("payment_callbacks_total", "outcome" => "malformed").increment(1);
            tracing::warn!("unintelligible provider callback");
            return Ok(CallbackOutcome::Malformed);
        };

        let Some(mut payment) = self
            .store
            .find_payment_by_transaction_id(&event.transaction_id)
            .await?
        else {
            metrics::counter!("payment_callbacks_total", "outcome" => "unmatched").increment(1);
            tracing::warn!(transaction_id = %event.transaction_id, "callback for unknown transaction");
            return Ok(CallbackOutcome::Unmatched);
        };

        if payment.state.is_terminal() {
            metrics::counter!("payment_callbacks_total", "outcome" => "already_settled")
                .increment(1);
            tracing::info!(payment_id = %payment.id, "replayed callback ignored");
            return Ok(CallbackOutcome::AlreadySettled);
        }

        payment.provider_response = Some(payload.clone());
        match event.resolution {
            PaymentResolution::Success => payment.succeed()?,
            PaymentResolution::Cancelled => payment.cancel()?,
            PaymentResolution::Failed => payment.fail()?,
        }
        self.store.update_payment(&payment).await?;

        let mut order = self.load_order(payment.order_id).await?;
        match event.resolution {
            PaymentResolution::Success => {
                order.mark_paid();
                if order.status.can_confirm() {
                    order.confirm()?;
                }
                self.store.update_order(&order).await?;

                let sink = self.notifier.clone();
                let notified = order.clone();
                tokio::spawn(async move { sink.order_confirmed(notified).await });
            }
            PaymentResolution::Cancelled | PaymentResolution::Failed => {
                order.mark_payment_failed();
                // The claim is atomic at the store, so a duplicate delivery
                // racing this one restores nothing.
                if self.store.claim_stock_release(order.id).await? {
                    order.release_stock_once();
                    self.restore_items(&order).await;
                }
                self.store.update_order(&order).await?;

                let sink = self.notifier.clone();
                let (notified, failed) = (order.clone(), payment.clone());
                tokio::spawn(async move { sink.payment_failed(notified, failed).await });
            }
        }

        metrics::counter!("payment_callbacks_total", "outcome" => "applied").increment(1);
        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            state = %payment.state.as_str(),
            "callback applied"
        );
        Ok(CallbackOutcome::Applied)
    }

    /// Cancels an order, restoring its reserved stock exactly once.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self.load_order(order_id).await?;

        if !order.status.can_cancel() {
            return Err(EngineError::OrderNotCancellable { order_id });
        }

        order.cancel()?;
        if self.store.claim_stock_release(order_id).await? {
            order.release_stock_once();
            self.restore_items(&order).await;
        }
        self.store.update_order(&order).await?;

        if let Some(mut payment) = self.store.find_pending_payment_for_order(order_id).await? {
            payment.cancel()?;
            self.store.update_payment(&payment).await?;
        }

        if order.payment_status == PaymentStatus::Paid {
            let sink = self.notifier.clone();
            let notified = order.clone();
            tokio::spawn(async move { sink.refund_required(notified, None).await });
        }

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_id = %order.id, "order cancelled");
        Ok(order)
    }

    /// Moves an order along the fulfilment pipeline (staff operation).
    #[tracing::instrument(skip(self, tracking_number))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        // Cancellation has its own compensation path.
        if status == OrderStatus::Cancelled {
            return self.cancel_order(order_id).await;
        }

        let mut order = self.load_order(order_id).await?;
        order.set_status(status, tracking_number)?;
        self.store.update_order(&order).await?;

        if matches!(status, OrderStatus::Shipped | OrderStatus::Delivered) {
            let sink = self.notifier.clone();
            let notified = order.clone();
            tokio::spawn(async move { sink.delivery_update(notified).await });
        }

        Ok(order)
    }

    /// Fetches an order.
    pub async fn order(&self, order_id: OrderId) -> Result<Order> {
        self.load_order(order_id).await
    }

    /// Lists orders, optionally filtered by status.
    pub async fn orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(status).await?)
    }

    /// Fetches a payment by its provider transaction handle.
    pub async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Payment> {
        self.store
            .find_payment_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| EngineError::PaymentNotFound {
                transaction_id: transaction_id.to_string(),
            })
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(EngineError::OrderNotFound { order_id })
    }

    /// Reserves every line; on failure, rolls back the lines already held.
    async fn reserve_items(&self, items: &[OrderItem]) -> Result<()> {
        let mut reserved: Vec<&OrderItem> = Vec::new();
        for item in items {
            match self.store.reserve_stock(item.product_id, item.quantity).await {
                Ok(()) => reserved.push(item),
                Err(e) => {
                    for held in reserved {
                        if let Err(rollback) = self
                            .store
                            .restore_stock(held.product_id, held.quantity)
                            .await
                        {
                            tracing::error!(
                                product_id = %held.product_id,
                                error = %rollback,
                                "reservation rollback failed"
                            );
                        }
                    }
                    return Err(match e {
                        StoreError::InsufficientStock {
                            product_id,
                            requested,
                        } => {
                            let available = self
                                .store
                                .get_product(product_id)
                                .await
                                .ok()
                                .flatten()
                                .map(|p| p.stock)
                                .unwrap_or(0);
                            EngineError::InsufficientStock {
                                product_id,
                                requested,
                                available,
                            }
                        }
                        StoreError::ProductNotFound { product_id } => {
                            EngineError::ProductNotFound { product_id }
                        }
                        other => other.into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns every line's stock. Restoration failures are logged and
    /// skipped; they must not wedge settlement.
    async fn restore_items(&self, order: &Order) {
        for item in &order.items {
            if let Err(e) = self
                .store
                .restore_stock(item.product_id, item.quantity)
                .await
            {
                tracing::error!(
                    order_id = %order.id,
                    product_id = %item.product_id,
                    error = %e,
                    "stock restoration failed"
                );
            }
        }
    }

    /// Creates the payment record and pushes it through the provider.
    ///
    /// Acceptance attaches the provider handle and leaves the record
    /// pending; any push failure persists the record as failed and marks
    /// the order's payment failed, with stock left reserved for a retry.
    async fn push_and_record(
        &self,
        order: &mut Order,
        provider: Provider,
        phone: PhoneNumber,
    ) -> Result<Payment> {
        metrics::counter!("payments_initiated_total", "provider" => provider.as_str())
            .increment(1);

        let mut payment = Payment::new(order.id, provider, phone.clone(), order.totals.grand_total);
        let request = PushRequest {
            phone,
            amount: order.totals.grand_total,
            reference: order.order_number.as_str().to_string(),
        };

        match self.gateways.push_payment(provider, &request).await {
            Ok(outcome) => {
                payment.attach_provider_handle(outcome.handle, outcome.provider_ref, outcome.raw);
                // The store is the arbiter when two retries race past the
                // pending-payment check above.
                self.store.insert_payment(&payment).await.map_err(|e| match e {
                    StoreError::PaymentAlreadyPending { order_id } => {
                        EngineError::PaymentAlreadyPending { order_id }
                    }
                    other => other.into(),
                })?;
                Ok(payment)
            }
            Err(GatewayError::Rejected { code, description }) => {
                tracing::warn!(order_id = %order.id, code = %code, "payment push rejected");
                payment.provider_response =
                    Some(json!({"code": code, "description": description.clone()}));
                payment.fail()?;
                self.store.insert_payment(&payment).await?;
                order.mark_payment_failed();
                self.store.update_order(order).await?;

                Err(EngineError::GatewayRejected {
                    order_id: order.id,
                    description,
                })
            }
            Err(e) => {
                payment.fail()?;
                self.store.insert_payment(&payment).await?;
                order.mark_payment_failed();
                self.store.update_order(order).await?;

                tracing::warn!(order_id = %order.id, error = %e, "payment provider unreachable");
                Err(EngineError::GatewayUnavailable {
                    order_id: order.id,
                    reason: e.to_string(),
                })
            }
        }
    }
}
