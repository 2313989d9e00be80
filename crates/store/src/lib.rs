//! Persistence layer for the order-fulfillment system.
//!
//! Provides typed store traits for products (the inventory ledger),
//! orders, payments, and OTPs, with two implementations:
//! - [`PostgresStore`] backed by `sqlx`, where stock reservation is an
//!   atomic conditional decrement at the database
//! - [`InMemoryStore`] for tests, where the same guarantee comes from a
//!   single write lock around the read-modify-write

pub mod error;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use product::Product;
pub use traits::{OrderStore, OtpStore, PaymentStore, ProductStore, Store};
