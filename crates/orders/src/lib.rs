//! `checkout-orders` — the order aggregate and its assembly.
//!
//! An [`Order`] plus its line items form one consistency unit: built once by
//! the [`OrderBuilder`] from authoritative catalog prices, persisted
//! atomically, never field-mutated afterwards.

pub mod builder;
pub mod order;
pub mod request;
pub mod result;

pub use builder::OrderBuilder;
pub use order::{Order, OrderLineItem, OrderStatus};
pub use request::{CheckoutRequest, PaymentMethod, RequestedItem};
pub use result::OrderResult;
