//! Order aggregate and related value objects.

mod aggregate;
mod status;
mod value_objects;

pub use aggregate::{Order, OrderError};
pub use status::{OrderStatus, PaymentStatus};
pub use value_objects::{Address, OrderItem, OrderNumber, OrderTotals, PhoneNumber};
