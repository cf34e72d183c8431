//! `checkout-catalog` — product catalog domain: price and stock by identifier.

pub mod accessor;
pub mod product;

pub use accessor::CatalogAccessor;
pub use product::Product;
