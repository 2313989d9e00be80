//! Catalog product with its stock counter.

use common::ProductId;
use domain::Money;
use serde::{Deserialize, Serialize};

/// A catalog product.
///
/// The stock counter is owned by the inventory ledger: order logic never
/// assigns it directly, only through `reserve_stock` / `restore_stock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub stock: i64,
}

impl Product {
    /// Creates a new product.
    pub fn new(id: ProductId, name: impl Into<String>, unit_price: Money, stock: i64) -> Self {
        Self {
            id,
            name: name.into(),
            unit_price,
            stock,
        }
    }
}
