//! PostgreSQL store implementation.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, ProductId};
use domain::{
    Address, Money, Order, OrderItem, OrderNumber, OrderStatus, OrderTotals, Otp, OtpPurpose,
    Payment, PaymentState, PaymentStatus, PhoneNumber, Provider,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::product::Product;
use crate::traits::{OrderStore, OtpStore, PaymentStore, ProductStore};

/// PostgreSQL-backed store.
///
/// Stock reservation is a single conditional `UPDATE`, so concurrent
/// reservations serialize at the row lock and can never drive the counter
/// negative.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            stock: row.try_get("stock")?,
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let shipping_address: serde_json::Value = row.try_get("shipping_address")?;
        let billing_address: serde_json::Value = row.try_get("billing_address")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: OrderNumber::from(row.try_get::<String, _>("order_number")?),
            status: parse_column::<OrderStatus>(row, "status")?,
            payment_status: parse_column::<PaymentStatus>(row, "payment_status")?,
            payment_method: parse_column::<Provider>(row, "payment_method")?,
            payer_phone: phone_column(row, "payer_phone")?,
            items,
            totals: OrderTotals {
                subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
                shipping: Money::from_cents(row.try_get("shipping_cents")?),
                tax: Money::from_cents(row.try_get("tax_cents")?),
                discount: Money::from_cents(row.try_get("discount_cents")?),
                grand_total: Money::from_cents(row.try_get("grand_total_cents")?),
            },
            shipping_address: serde_json::from_value::<Address>(shipping_address)?,
            billing_address: serde_json::from_value::<Address>(billing_address)?,
            tracking_number: row.try_get("tracking_number")?,
            delivered_at: row.try_get::<Option<DateTime<Utc>>, _>("delivered_at")?,
            stock_released: row.try_get("stock_released")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            provider: parse_column::<Provider>(&row, "provider")?,
            phone: phone_column(&row, "phone")?,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            state: parse_column::<PaymentState>(&row, "state")?,
            transaction_id: row.try_get("transaction_id")?,
            provider_ref: row.try_get("provider_ref")?,
            provider_response: row.try_get("provider_response")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_otp(row: PgRow) -> Result<Otp> {
        Ok(Otp {
            phone: phone_column(&row, "phone")?,
            code: row.try_get("code")?,
            purpose: match row.try_get::<String, _>("purpose")?.as_str() {
                "login" => OtpPurpose::Login,
                "registration" => OtpPurpose::Registration,
                "password_reset" => OtpPurpose::PasswordReset,
                other => return Err(StoreError::Decode(format!("unknown OTP purpose: {other}"))),
            },
            expires_at: row.try_get("expires_at")?,
            used: row.try_get("used")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderItem {
                    product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                    product_name: row.try_get("product_name")?,
                    quantity: row.try_get::<i32, _>("quantity")? as u32,
                    unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                })
            })
            .collect()
    }
}

fn parse_column<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(StoreError::Decode)
}

fn phone_column(row: &PgRow, column: &str) -> Result<PhoneNumber> {
    let raw: String = row.try_get(column)?;
    PhoneNumber::new(&raw).map_err(|e| StoreError::Decode(e.to_string()))
}

const ORDER_COLUMNS: &str = "id, order_number, status, payment_status, payment_method, \
     payer_phone, subtotal_cents, shipping_cents, tax_cents, discount_cents, \
     grand_total_cents, shipping_address, billing_address, tracking_number, \
     delivered_at, stock_released, created_at, updated_at";

#[async_trait]
impl ProductStore for PostgresStore {
    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price_cents, stock)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                unit_price_cents = EXCLUDED.unit_price_cents,
                stock = EXCLUDED.stock,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.unit_price.cents())
        .bind(product.stock)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, unit_price_cents, stock FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn reserve_stock(&self, id: ProductId, quantity: u32) -> Result<()> {
        // The WHERE clause makes check-and-decrement one atomic statement.
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        if exists {
            Err(StoreError::InsufficientStock {
                product_id: id,
                requested: quantity,
            })
        } else {
            Err(StoreError::ProductNotFound { product_id: id })
        }
    }

    async fn restore_stock(&self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound { product_id: id });
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, status, payment_status, payment_method,
                payer_phone, subtotal_cents, shipping_cents, tax_cents,
                discount_cents, grand_total_cents, shipping_address,
                billing_address, tracking_number, delivered_at, stock_released,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.payer_phone.as_str())
        .bind(order.totals.subtotal.cents())
        .bind(order.totals.shipping.cents())
        .bind(order.totals.tax.cents())
        .bind(order.totals.discount.cents())
        .bind(order.totals.grand_total.cents())
        .bind(serde_json::to_value(&order.shipping_address)?)
        .bind(serde_json::to_value(&order.billing_address)?)
        .bind(&order.tracking_number)
        .bind(order.delivered_at)
        .bind(order.stock_released)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(item.quantity as i32)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let items = self.items_for_order(id).await?;
                Ok(Some(Self::row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 ORDER BY created_at DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
            let items = self.items_for_order(id).await?;
            orders.push(Self::row_to_order(&row, items)?);
        }
        Ok(orders)
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        // Line items are frozen at creation, so only order-level fields move.
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                payment_status = $3,
                tracking_number = $4,
                delivered_at = $5,
                stock_released = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.tracking_number)
        .bind(order.delivered_at)
        .bind(order.stock_released)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn claim_stock_release(&self, order_id: OrderId) -> Result<bool> {
        // Same shape as the stock decrement: the WHERE clause makes the
        // claim a single atomic statement.
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET stock_released = TRUE, updated_at = NOW()
            WHERE id = $1 AND stock_released = FALSE
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

const PAYMENT_COLUMNS: &str = "id, order_id, provider, phone, amount_cents, currency, state, \
     transaction_id, provider_ref, provider_response, created_at, updated_at";

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, provider, phone, amount_cents, currency, state,
                transaction_id, provider_ref, provider_response, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.provider.as_str())
        .bind(payment.phone.as_str())
        .bind(payment.amount.cents())
        .bind(&payment.currency)
        .bind(payment.state.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.provider_ref)
        .bind(&payment.provider_response)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            match e.as_database_error().and_then(|db| db.constraint()) {
                // The partial unique index on open attempts.
                Some("idx_payments_one_pending_per_order") => StoreError::PaymentAlreadyPending {
                    order_id: payment.order_id,
                },
                _ => e.into(),
            }
        })?;

        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET state = $2,
                transaction_id = $3,
                provider_ref = $4,
                provider_response = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.state.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.provider_ref)
        .bind(&payment.provider_response)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_payment_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_pending_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE order_id = $1 AND state = 'pending' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }
}

#[async_trait]
impl OtpStore for PostgresStore {
    async fn insert_otp(&self, otp: &Otp) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO otps (phone, code, purpose, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(otp.phone.as_str())
        .bind(&otp.code)
        .bind(otp.purpose.as_str())
        .bind(otp.expires_at)
        .bind(otp.used)
        .bind(otp.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_active_otp(
        &self,
        phone: &PhoneNumber,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>> {
        let row = sqlx::query(
            r#"
            SELECT phone, code, purpose, expires_at, used, created_at
            FROM otps
            WHERE phone = $1 AND purpose = $2 AND used = FALSE AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(phone.as_str())
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_otp).transpose()
    }

    async fn mark_otp_used(
        &self,
        phone: &PhoneNumber,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE otps
            SET used = TRUE
            WHERE phone = $1 AND purpose = $2 AND code = $3 AND used = FALSE
            "#,
        )
        .bind(phone.as_str())
        .bind(purpose.as_str())
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
