//! Order builder: turns a checkout request plus current catalog state into an
//! immutable priced aggregate.
//!
//! The builder never trusts client-supplied prices. Line items snapshot the
//! authoritative catalog price; the client-claimed totals are only compared
//! against the server-computed ones, within a small rounding tolerance, as a
//! tamper check.

use std::collections::HashMap;

use tracing::warn;

use checkout_catalog::Product;
use checkout_core::{BuyerId, DomainError, DomainResult, Money, OrderId, ProductId};

use crate::order::{Order, OrderLineItem};
use crate::request::CheckoutRequest;

/// Assembles pending orders from checkout requests.
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    tolerance: Money,
}

impl OrderBuilder {
    /// Default rounding tolerance for the client-vs-server totals comparison.
    pub const DEFAULT_TOLERANCE: Money = Money::from_cents(1);

    pub fn new(tolerance: Money) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Money {
        self.tolerance
    }

    /// Build a pending [`Order`] for `buyer` from `request`, pricing every
    /// line from `products` (the catalog rows loaded inside the checkout
    /// transaction). Touches no inventory.
    pub fn build(
        &self,
        buyer: BuyerId,
        request: &CheckoutRequest,
        products: &[Product],
    ) -> DomainResult<Order> {
        request.validate()?;

        let by_id: HashMap<ProductId, &Product> =
            products.iter().map(|p| (p.id_typed(), p)).collect();

        let mut line_items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = by_id
                .get(&item.product_id)
                .ok_or(DomainError::ProductNotFound(item.product_id))?;

            if item.client_unit_price != product.unit_price() {
                // The catalog price wins; a disagreement here is worth a log
                // line but the totals check below decides whether to fail.
                warn!(
                    product_id = %item.product_id,
                    client_price = %item.client_unit_price,
                    catalog_price = %product.unit_price(),
                    "client unit price disagrees with catalog"
                );
            }

            line_items.push(OrderLineItem::new(
                item.product_id,
                item.quantity,
                product.unit_price(),
            )?);
        }

        let subtotal = Money::checked_sum(line_items.iter().map(|l| l.subtotal))?;
        if !subtotal.within_tolerance(request.client_subtotal, self.tolerance) {
            return Err(DomainError::TotalsMismatch {
                claimed: request.client_subtotal,
                computed: subtotal,
            });
        }

        let total = subtotal.checked_add(request.shipping_cost)?;
        if !total.within_tolerance(request.client_total, self.tolerance) {
            return Err(DomainError::TotalsMismatch {
                claimed: request.client_total,
                computed: total,
            });
        }

        Order::assemble(OrderId::new(), buyer, line_items, request.shipping_cost)
    }
}

impl Default for OrderBuilder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{PaymentMethod, RequestedItem};
    use checkout_core::IdempotencyKey;

    fn product(cents: i64, stock: i64) -> Product {
        Product::new(ProductId::new(), "Widget", Money::from_cents(cents), stock).unwrap()
    }

    fn request_for(items: Vec<RequestedItem>, subtotal: i64, shipping: i64) -> CheckoutRequest {
        CheckoutRequest {
            payment_method: PaymentMethod::Card,
            payment_details: serde_json::json!({}),
            items,
            client_subtotal: Money::from_cents(subtotal),
            shipping_cost: Money::from_cents(shipping),
            client_total: Money::from_cents(subtotal + shipping),
            idempotency_key: IdempotencyKey::parse("test-key").unwrap(),
        }
    }

    #[test]
    fn builds_order_with_catalog_prices() {
        // Cart [(P1, qty=2, 10.00), (P2, qty=1, 5.00)], claimed subtotal
        // 25.00 -> succeeds with subtotal 25.00.
        let p1 = product(1000, 10);
        let p2 = product(500, 10);
        let request = request_for(
            vec![
                RequestedItem {
                    product_id: p1.id_typed(),
                    quantity: 2,
                    client_unit_price: Money::from_cents(1000),
                },
                RequestedItem {
                    product_id: p2.id_typed(),
                    quantity: 1,
                    client_unit_price: Money::from_cents(500),
                },
            ],
            2500,
            0,
        );

        let order = OrderBuilder::default()
            .build(BuyerId::new(), &request, &[p1.clone(), p2.clone()])
            .unwrap();

        assert_eq!(order.subtotal(), Money::from_cents(2500));
        assert_eq!(order.total(), Money::from_cents(2500));
        assert_eq!(order.line_items().len(), 2);
        assert_eq!(order.line_items()[0].unit_price, p1.unit_price());
        assert_eq!(order.line_items()[1].unit_price, p2.unit_price());
    }

    #[test]
    fn claimed_subtotal_off_by_too_much_is_a_mismatch() {
        // Same cart, claimed subtotal 20.00 (actual 25.00) -> TotalsMismatch.
        let p1 = product(1000, 10);
        let p2 = product(500, 10);
        let request = request_for(
            vec![
                RequestedItem {
                    product_id: p1.id_typed(),
                    quantity: 2,
                    client_unit_price: Money::from_cents(1000),
                },
                RequestedItem {
                    product_id: p2.id_typed(),
                    quantity: 1,
                    client_unit_price: Money::from_cents(500),
                },
            ],
            2000,
            0,
        );

        let err = OrderBuilder::default()
            .build(BuyerId::new(), &request, &[p1, p2])
            .unwrap_err();
        match err {
            DomainError::TotalsMismatch { claimed, computed } => {
                assert_eq!(claimed, Money::from_cents(2000));
                assert_eq!(computed, Money::from_cents(2500));
            }
            other => panic!("expected TotalsMismatch, got {other:?}"),
        }
    }

    #[test]
    fn one_cent_rounding_difference_is_tolerated() {
        let p = product(333, 10);
        let mut request = request_for(
            vec![RequestedItem {
                product_id: p.id_typed(),
                quantity: 3,
                client_unit_price: Money::from_cents(333),
            }],
            999,
            0,
        );
        request.client_subtotal = Money::from_cents(1000);
        request.client_total = Money::from_cents(1000);

        let order = OrderBuilder::default()
            .build(BuyerId::new(), &request, &[p])
            .unwrap();
        // Persisted totals come from the server computation, not the claim.
        assert_eq!(order.subtotal(), Money::from_cents(999));
    }

    #[test]
    fn tampered_client_price_does_not_lower_the_order_total() {
        let p = product(1000, 10);
        let request = request_for(
            vec![RequestedItem {
                product_id: p.id_typed(),
                quantity: 1,
                client_unit_price: Money::from_cents(1), // tampered
            }],
            1000, // but the claimed totals are honest
            0,
        );

        let order = OrderBuilder::default()
            .build(BuyerId::new(), &request, &[p.clone()])
            .unwrap();
        assert_eq!(order.line_items()[0].unit_price, p.unit_price());
        assert_eq!(order.subtotal(), Money::from_cents(1000));
    }

    #[test]
    fn unknown_product_fails_the_build() {
        let p = product(1000, 10);
        let ghost = ProductId::new();
        let request = request_for(
            vec![RequestedItem {
                product_id: ghost,
                quantity: 1,
                client_unit_price: Money::from_cents(1000),
            }],
            1000,
            0,
        );

        let err = OrderBuilder::default()
            .build(BuyerId::new(), &request, &[p])
            .unwrap_err();
        assert_eq!(err, DomainError::ProductNotFound(ghost));
    }

    #[test]
    fn shipping_is_included_in_the_total_check() {
        let p = product(1000, 10);
        let mut request = request_for(
            vec![RequestedItem {
                product_id: p.id_typed(),
                quantity: 1,
                client_unit_price: Money::from_cents(1000),
            }],
            1000,
            500,
        );
        request.client_total = Money::from_cents(1000); // forgot shipping

        let err = OrderBuilder::default()
            .build(BuyerId::new(), &request, &[p])
            .unwrap_err();
        assert!(matches!(err, DomainError::TotalsMismatch { .. }));
    }
}
