//! Value objects for the order domain.

use common::ProductId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

use super::aggregate::OrderError;

/// Human-readable, globally unique order number (e.g. `ORD-a1b2c3d4`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a new order number.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("ORD-{}", &suffix[..8]))
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A subscriber phone number in MSISDN form.
///
/// Accepts digits with an optional leading `+`; whitespace is stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Validates and normalizes a phone number.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, OrderError> {
        let cleaned: String = raw.as_ref().chars().filter(|c| !c.is_whitespace()).collect();
        let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

        if digits.len() < 10 || digits.len() > 13 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(OrderError::InvalidPhoneNumber(cleaned));
        }

        Ok(Self(cleaned))
    }

    /// Returns the phone number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A shipping or billing address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub address1: String,
    #[serde(default)]
    pub address2: Option<String>,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    pub phone: String,
}

/// A line item frozen into an order at creation time.
///
/// The product name and unit price are captured from the live catalog
/// when the order is created and never re-read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The ordered product.
    pub product_id: ProductId,

    /// Product name at order time.
    pub product_name: String,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit at order time.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the total price for this line (quantity * unit_price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// The monetary totals of an order, computed once at creation.
///
/// Invariant: `grand_total = subtotal + shipping + tax - discount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub discount: Money,
    pub grand_total: Money,
}

impl OrderTotals {
    /// Computes totals from the frozen line items.
    ///
    /// Tax is a whole percentage of the item subtotal only; shipping is
    /// not taxed.
    pub fn compute(
        items: &[OrderItem],
        shipping: Money,
        tax_rate_percent: u8,
        discount: Money,
    ) -> Self {
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
        let tax = subtotal.percent(tax_rate_percent);
        Self {
            subtotal,
            shipping,
            tax,
            discount,
            grand_total: subtotal + shipping + tax - discount,
        }
    }
}
