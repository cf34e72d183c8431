//! End-to-end checkout tests: orchestrator + order builder + in-memory store.
//!
//! These exercise the same paths production takes, with the reference store
//! standing in for Postgres. Conservation, oversell protection, atomicity,
//! and idempotent replay are all verified through the public surface only.

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use checkout_catalog::{CatalogAccessor, Product};
use checkout_core::{BuyerId, IdempotencyKey, Money, ProductId};
use checkout_engine::{CheckoutOrchestrator, CheckoutStore, RetryPolicy};
use checkout_orders::{CheckoutRequest, OrderBuilder, PaymentMethod, RequestedItem};

use crate::audit::InMemoryAudit;
use crate::notify::RecordingNotifier;
use crate::store::memory::InMemoryCheckoutStore;

struct Harness {
    store: Arc<InMemoryCheckoutStore>,
    notifier: Arc<RecordingNotifier>,
    audit: Arc<InMemoryAudit>,
    orchestrator: Arc<CheckoutOrchestrator<InMemoryCheckoutStore>>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryCheckoutStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let audit = Arc::new(InMemoryAudit::new());
    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        OrderBuilder::default(),
        notifier.clone(),
        audit.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
    ));
    Harness {
        store,
        notifier,
        audit,
        orchestrator,
    }
}

async fn seed_product(h: &Harness, price_cents: i64, stock: i64) -> ProductId {
    let product = Product::new(
        ProductId::new(),
        "Widget",
        Money::from_cents(price_cents),
        stock,
    )
    .unwrap();
    let id = product.id_typed();
    h.store.insert_product(product).await;
    id
}

async fn seed_buyer(h: &Harness) -> BuyerId {
    let buyer = BuyerId::new();
    h.store.register_buyer(buyer).await;
    buyer
}

/// Request whose claimed totals are computed from the given prices, so the
/// totals check passes unless a test tampers with them.
fn request(items: &[(ProductId, u32, i64)], shipping_cents: i64, key: &str) -> CheckoutRequest {
    let subtotal: i64 = items
        .iter()
        .map(|(_, qty, price)| i64::from(*qty) * price)
        .sum();
    CheckoutRequest {
        payment_method: PaymentMethod::Card,
        payment_details: serde_json::json!({ "last4": "4242" }),
        items: items
            .iter()
            .map(|(id, qty, price)| RequestedItem {
                product_id: *id,
                quantity: *qty,
                client_unit_price: Money::from_cents(*price),
            })
            .collect(),
        client_subtotal: Money::from_cents(subtotal),
        shipping_cost: Money::from_cents(shipping_cents),
        client_total: Money::from_cents(subtotal + shipping_cents),
        idempotency_key: IdempotencyKey::parse(key).unwrap(),
    }
}

async fn stock_of(h: &Harness, id: ProductId) -> i64 {
    h.store.product(id).await.unwrap().unwrap().stock()
}

#[tokio::test]
async fn successful_checkout_decrements_stock_and_persists_the_order() {
    let h = harness();
    let p1 = seed_product(&h, 1000, 5).await;
    let p2 = seed_product(&h, 500, 5).await;
    let buyer = seed_buyer(&h).await;

    let result = h
        .orchestrator
        .checkout(buyer, &request(&[(p1, 2, 1000), (p2, 1, 500)], 0, "k1"))
        .await;

    assert!(result.success, "unexpected failure: {}", result.message);
    assert_eq!(stock_of(&h, p1).await, 3);
    assert_eq!(stock_of(&h, p2).await, 4);

    let order_id = result.order_id.unwrap();
    let order = h.store.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.subtotal(), Money::from_cents(2500));
    assert_eq!(order.total(), Money::from_cents(2500));
    assert_eq!(order.line_items().len(), 2);
    assert_eq!(result.order_number.as_deref(), Some(order.order_number().as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_oversell() {
    let h = harness();
    let pid = seed_product(&h, 1000, 5).await;
    let buyer_a = seed_buyer(&h).await;
    let buyer_b = seed_buyer(&h).await;

    let orch_a = h.orchestrator.clone();
    let orch_b = h.orchestrator.clone();
    let req_a = request(&[(pid, 3, 1000)], 0, "race-a");
    let req_b = request(&[(pid, 3, 1000)], 0, "race-b");

    let (a, b) = tokio::join!(
        tokio::spawn(async move { orch_a.checkout(buyer_a, &req_a).await }),
        tokio::spawn(async move { orch_b.checkout(buyer_b, &req_b).await }),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(
        u32::from(a.success) + u32::from(b.success),
        1,
        "exactly one of two qty=3 checkouts against stock 5 may win"
    );
    let loser = if a.success { &b } else { &a };
    assert_eq!(loser.error_kind.as_deref(), Some("insufficient_stock"));
    assert!(loser.message.contains("requested 3"));
    assert!(loser.message.contains("available 2"));

    assert_eq!(stock_of(&h, pid).await, 2);
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn contention_admits_exactly_floor_stock_over_quantity_buyers() {
    let h = harness();
    let pid = seed_product(&h, 100, 10).await;

    let mut handles = Vec::new();
    for i in 0..7 {
        let buyer = seed_buyer(&h).await;
        let orchestrator = h.orchestrator.clone();
        let req = request(&[(pid, 3, 100)], 0, &format!("contend-{i}"));
        handles.push(tokio::spawn(
            async move { orchestrator.checkout(buyer, &req).await },
        ));
    }

    let mut successes = 0u32;
    for handle in handles {
        if handle.await.unwrap().success {
            successes += 1;
        }
    }

    // floor(10 / 3) = 3 checkouts fit; stock ends at the remainder.
    assert_eq!(successes, 3);
    assert_eq!(stock_of(&h, pid).await, 1);
    assert_eq!(h.store.order_count().await, 3);
}

#[tokio::test]
async fn failed_multi_item_checkout_touches_no_stock() {
    let h = harness();
    let plentiful = seed_product(&h, 1000, 10).await;
    let scarce = seed_product(&h, 500, 1).await;
    let buyer = seed_buyer(&h).await;

    let result = h
        .orchestrator
        .checkout(
            buyer,
            &request(&[(plentiful, 2, 1000), (scarce, 2, 500)], 0, "k1"),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("insufficient_stock"));
    // The first item's decrement was rolled back with the transaction.
    assert_eq!(stock_of(&h, plentiful).await, 10);
    assert_eq!(stock_of(&h, scarce).await, 1);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn replayed_idempotency_key_returns_the_committed_order_without_a_second_decrement() {
    let h = harness();
    let pid = seed_product(&h, 1000, 5).await;
    let buyer = seed_buyer(&h).await;

    let req = request(&[(pid, 2, 1000)], 0, "retry-key");
    let first = h.orchestrator.checkout(buyer, &req).await;
    let second = h.orchestrator.checkout(buyer, &req).await;

    assert!(first.success);
    assert!(second.success);
    assert_eq!(first.order_id, second.order_id);
    assert_eq!(first.order_number, second.order_number);
    assert_eq!(stock_of(&h, pid).await, 3);
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test]
async fn same_key_for_different_buyers_is_two_separate_checkouts() {
    let h = harness();
    let pid = seed_product(&h, 1000, 5).await;
    let buyer_a = seed_buyer(&h).await;
    let buyer_b = seed_buyer(&h).await;

    let a = h
        .orchestrator
        .checkout(buyer_a, &request(&[(pid, 1, 1000)], 0, "shared"))
        .await;
    let b = h
        .orchestrator
        .checkout(buyer_b, &request(&[(pid, 1, 1000)], 0, "shared"))
        .await;

    assert!(a.success && b.success);
    assert_ne!(a.order_id, b.order_id);
    assert_eq!(stock_of(&h, pid).await, 3);
}

#[tokio::test]
async fn totals_mismatch_rejects_the_checkout_before_touching_stock() {
    let h = harness();
    let p1 = seed_product(&h, 1000, 5).await;
    let p2 = seed_product(&h, 500, 5).await;
    let buyer = seed_buyer(&h).await;

    // Claimed 20.00 against a computed 25.00.
    let mut req = request(&[(p1, 2, 1000), (p2, 1, 500)], 0, "k1");
    req.client_subtotal = Money::from_cents(2000);
    req.client_total = Money::from_cents(2000);

    let result = h.orchestrator.checkout(buyer, &req).await;

    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("totals_mismatch"));
    assert_eq!(stock_of(&h, p1).await, 5);
    assert_eq!(stock_of(&h, p2).await, 5);
    assert_eq!(h.store.order_count().await, 0);

    let failures = h.audit.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error_kind, "totals_mismatch");
    assert_eq!(failures[0].buyer_id, buyer);
}

#[tokio::test]
async fn tampered_client_price_is_overridden_by_the_catalog() {
    let h = harness();
    let pid = seed_product(&h, 1000, 5).await;
    let buyer = seed_buyer(&h).await;

    // Client claims a 1.00 unit price and totals consistent with it.
    let result = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 2, 100)], 0, "k1"))
        .await;

    // The server-side totals check catches the discrepancy.
    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("totals_mismatch"));
    assert_eq!(stock_of(&h, pid).await, 5);
}

#[tokio::test]
async fn unknown_buyer_is_rejected_without_opening_a_transaction() {
    let h = harness();
    let pid = seed_product(&h, 1000, 5).await;

    let result = h
        .orchestrator
        .checkout(BuyerId::new(), &request(&[(pid, 1, 1000)], 0, "k1"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("buyer_not_found"));
    assert_eq!(stock_of(&h, pid).await, 5);
}

#[tokio::test]
async fn unknown_product_fails_the_checkout() {
    let h = harness();
    let buyer = seed_buyer(&h).await;

    let result = h
        .orchestrator
        .checkout(buyer, &request(&[(ProductId::new(), 1, 1000)], 0, "k1"))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("product_not_found"));
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn notification_fires_once_per_committed_order_and_never_on_failure() {
    let h = harness();
    let pid = seed_product(&h, 1000, 2).await;
    let buyer = seed_buyer(&h).await;

    let ok = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 2, 1000)], 500, "k1"))
        .await;
    let failed = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 1, 1000)], 0, "k2"))
        .await;
    // Replay of the committed checkout re-sends nothing either.
    let replayed = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 2, 1000)], 500, "k1"))
        .await;

    assert!(ok.success);
    assert!(!failed.success);
    assert!(replayed.success);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(Some(sent[0].order_id), ok.order_id);
    assert_eq!(sent[0].buyer_id, buyer);
    assert_eq!(sent[0].total, Money::from_cents(2500));
}

#[tokio::test]
async fn duplicate_cart_lines_are_reserved_as_one_summed_demand() {
    let h = harness();
    let pid = seed_product(&h, 1000, 4).await;
    let buyer = seed_buyer(&h).await;

    let over = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 3, 1000), (pid, 2, 1000)], 0, "k1"))
        .await;
    assert!(!over.success);
    assert_eq!(over.error_kind.as_deref(), Some("insufficient_stock"));
    assert_eq!(stock_of(&h, pid).await, 4);

    let exact = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 2, 1000), (pid, 2, 1000)], 0, "k2"))
        .await;
    assert!(exact.success);
    assert_eq!(stock_of(&h, pid).await, 0);

    let order = h
        .store
        .find_order(exact.order_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    // The order keeps the cart's two lines; only the reservation is summed.
    assert_eq!(order.line_items().len(), 2);
}

#[tokio::test]
async fn restock_makes_a_previously_failing_checkout_succeed() {
    let h = harness();
    let pid = seed_product(&h, 1000, 1).await;
    let buyer = seed_buyer(&h).await;

    let before = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 3, 1000)], 0, "k1"))
        .await;
    assert!(!before.success);

    h.store.restock(pid, 5).await.unwrap();

    let after = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 3, 1000)], 0, "k2"))
        .await;
    assert!(after.success);
    assert_eq!(stock_of(&h, pid).await, 3);
}

#[tokio::test]
async fn buyer_order_history_comes_back_oldest_first() {
    let h = harness();
    let pid = seed_product(&h, 1000, 10).await;
    let buyer = seed_buyer(&h).await;
    let other = seed_buyer(&h).await;

    let first = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 1, 1000)], 0, "k1"))
        .await;
    let second = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 2, 1000)], 0, "k2"))
        .await;
    h.orchestrator
        .checkout(other, &request(&[(pid, 1, 1000)], 0, "k1"))
        .await;

    let history = h.store.orders_for_buyer(buyer).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(Some(history[0].id_typed()), first.order_id);
    assert_eq!(Some(history[1].id_typed()), second.order_id);
    assert!(history.iter().all(|o| o.buyer_id() == buyer));
}

#[tokio::test]
async fn configured_tolerance_flows_into_the_totals_check() {
    let store = Arc::new(InMemoryCheckoutStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let audit = Arc::new(InMemoryAudit::new());
    let config = crate::config::CheckoutConfig {
        database_url: "postgres://localhost/checkout".to_string(),
        max_connections: 1,
        statement_timeout: Duration::from_secs(1),
        retry: RetryPolicy::default(),
        totals_tolerance: Money::from_cents(50),
    };
    let orchestrator = crate::build_orchestrator(store.clone(), &config, notifier, audit);

    let product = Product::new(ProductId::new(), "Widget", Money::from_cents(1000), 5).unwrap();
    let pid = product.id_typed();
    store.insert_product(product).await;
    let buyer = BuyerId::new();
    store.register_buyer(buyer).await;

    // Claimed totals off by 30 cents, within the widened 50-cent tolerance.
    let mut req = request(&[(pid, 2, 1000)], 0, "k1");
    req.client_subtotal = Money::from_cents(2030);
    req.client_total = Money::from_cents(2030);

    let result = orchestrator.checkout(buyer, &req).await;
    assert!(result.success);
    // The persisted order still carries the server-computed totals.
    let order = store
        .find_order(result.order_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.total(), Money::from_cents(2000));
}

#[tokio::test]
async fn shipping_cost_is_carried_into_the_total() {
    let h = harness();
    let pid = seed_product(&h, 1000, 5).await;
    let buyer = seed_buyer(&h).await;

    let result = h
        .orchestrator
        .checkout(buyer, &request(&[(pid, 2, 1000)], 750, "k1"))
        .await;

    assert!(result.success);
    let order = h
        .store
        .find_order(result.order_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.subtotal(), Money::from_cents(2000));
    assert_eq!(order.shipping_cost(), Money::from_cents(750));
    assert_eq!(order.total(), Money::from_cents(2750));
}
