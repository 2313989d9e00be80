//! In-memory store implementation for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, PaymentId, ProductId};
use domain::{Order, OrderStatus, Otp, OtpPurpose, Payment, PhoneNumber};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::product::Product;
use crate::traits::{OrderStore, OtpStore, PaymentStore, ProductStore};

#[derive(Debug, Default)]
struct Inner {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    otps: Vec<Otp>,
}

/// In-memory store backed by a single `RwLock`.
///
/// `reserve_stock` performs its check-and-decrement under the write lock,
/// which gives the same no-oversell guarantee as the conditional UPDATE in
/// the Postgres implementation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current stock level of a product (test helper).
    pub async fn stock_of(&self, id: ProductId) -> Option<i64> {
        self.inner.read().await.products.get(&id).map(|p| p.stock)
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.inner
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.inner.read().await.products.get(&id).cloned())
    }

    async fn reserve_stock(&self, id: ProductId, quantity: u32) -> Result<()> {
        let mut inner = self.inner.write().await;
        let product = inner
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound { product_id: id })?;
        if product.stock < i64::from(quantity) {
            return Err(StoreError::InsufficientStock {
                product_id: id,
                requested: quantity,
            });
        }
        product.stock -= i64::from(quantity);
        Ok(())
    }

    async fn restore_stock(&self, id: ProductId, quantity: u32) -> Result<()> {
        let mut inner = self.inner.write().await;
        let product = inner
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound { product_id: id })?;
        product.stock += i64::from(quantity);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.inner
            .write()
            .await
            .orders
            .insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.inner
            .write()
            .await
            .orders
            .insert(order.id, order.clone());
        Ok(())
    }

    async fn claim_stock_release(&self, order_id: OrderId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.orders.get_mut(&order_id) {
            Some(order) if !order.stock_released => {
                order.stock_released = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut inner = self.inner.write().await;
        // Same invariant the partial unique index holds in Postgres.
        if !payment.state.is_terminal()
            && inner
                .payments
                .values()
                .any(|p| p.order_id == payment.order_id && !p.state.is_terminal())
        {
            return Err(StoreError::PaymentAlreadyPending {
                order_id: payment.order_id,
            });
        }
        inner.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        self.inner
            .write()
            .await
            .payments
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.inner.read().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .inner
            .read()
            .await
            .payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn find_pending_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .inner
            .read()
            .await
            .payments
            .values()
            .find(|p| p.order_id == order_id && !p.state.is_terminal())
            .cloned())
    }
}

#[async_trait]
impl OtpStore for InMemoryStore {
    async fn insert_otp(&self, otp: &Otp) -> Result<()> {
        self.inner.write().await.otps.push(otp.clone());
        Ok(())
    }

    async fn find_active_otp(
        &self,
        phone: &PhoneNumber,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>> {
        let now = Utc::now();
        let inner = self.inner.read().await;
        Ok(inner
            .otps
            .iter()
            .filter(|o| {
                &o.phone == phone && o.purpose == purpose && !o.used && o.expires_at > now
            })
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn mark_otp_used(
        &self,
        phone: &PhoneNumber,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        for otp in inner.otps.iter_mut() {
            if &otp.phone == phone && otp.purpose == purpose && otp.code == code && !otp.used {
                otp.used = true;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
