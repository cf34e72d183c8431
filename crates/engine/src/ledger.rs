//! Inventory ledger planning: what to decrement, in which order.
//!
//! The authoritative decrement itself is a single conditional statement
//! executed by the storage adapter (`UPDATE … WHERE stock >= quantity`, or the
//! in-memory equivalent). This module owns the request-shaping rules that are
//! the same for every backend: duplicate cart entries are summed before
//! checking, and rows are always touched in ascending product-id order so two
//! concurrent checkouts sharing products can never deadlock on each other.

use std::collections::BTreeMap;

use checkout_core::{DomainError, DomainResult, ProductId};
use checkout_orders::OrderLineItem;

/// One planned conditional decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDemand {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Collapse line items into per-product demands, sorted ascending by id.
///
/// Quantities for the same product are summed with overflow checking; a zero
/// total quantity is rejected (the builder should have caught it earlier).
pub fn plan_demands(line_items: &[OrderLineItem]) -> DomainResult<Vec<StockDemand>> {
    let mut by_product: BTreeMap<ProductId, u32> = BTreeMap::new();
    for line in line_items {
        if line.quantity == 0 {
            return Err(DomainError::validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        let entry = by_product.entry(line.product_id).or_insert(0);
        *entry = entry.checked_add(line.quantity).ok_or_else(|| {
            DomainError::validation(format!(
                "total quantity for product {} overflowed",
                line.product_id
            ))
        })?;
    }

    // BTreeMap iteration is already ascending by ProductId; the total lock
    // order across concurrent requests follows from that.
    Ok(by_product
        .into_iter()
        .map(|(product_id, quantity)| StockDemand {
            product_id,
            quantity,
        })
        .collect())
}
