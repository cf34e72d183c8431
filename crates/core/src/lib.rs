//! `checkout-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BuyerId, IdempotencyKey, OrderId, ProductId};
pub use money::Money;
pub use value_object::ValueObject;
