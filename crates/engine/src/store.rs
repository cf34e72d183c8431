//! Storage seam for the checkout transaction.
//!
//! A [`CheckoutStore`] opens transactions; every mutation of a single checkout
//! (idempotency lookup, product load, conditional decrements, order insert)
//! happens through one [`CheckoutTx`] and becomes visible only at `commit`.
//! Dropping a transaction without committing must discard all of its effects.

use async_trait::async_trait;

use checkout_catalog::Product;
use checkout_core::{BuyerId, DomainResult, IdempotencyKey, OrderId, ProductId};
use checkout_orders::Order;

use crate::ledger::StockDemand;

/// The durable record of a previously committed checkout, keyed by
/// idempotency key. Replays return this instead of running a fresh checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedCheckout {
    pub order_id: OrderId,
    pub order_number: String,
}

/// One checkout transaction. All-or-nothing: either `commit` makes every
/// decrement and the order visible together, or nothing is.
#[async_trait]
pub trait CheckoutTx: Send {
    /// Look up a previously committed checkout for `(buyer, key)` inside this
    /// transaction's snapshot.
    async fn committed_checkout(
        &mut self,
        buyer: BuyerId,
        key: &IdempotencyKey,
    ) -> DomainResult<Option<CommittedCheckout>>;

    /// Load catalog rows for pricing. Unknown ids are omitted.
    async fn load_products(&mut self, ids: &[ProductId]) -> DomainResult<Vec<Product>>;

    /// Execute one conditional decrement per demand, in the given (ascending)
    /// order. The first demand that finds insufficient stock fails the whole
    /// call with `InsufficientStock`, `available` read as part of the same
    /// attempt; prior decrements in this transaction are discarded with it.
    async fn reserve_and_decrement(&mut self, demands: &[StockDemand]) -> DomainResult<()>;

    /// Persist the order, its line items, and the idempotency key as one
    /// unit inside this transaction.
    async fn insert_order(&mut self, order: &Order, key: &IdempotencyKey) -> DomainResult<()>;

    async fn commit(self) -> DomainResult<()>
    where
        Self: Sized;

    async fn rollback(self) -> DomainResult<()>
    where
        Self: Sized;
}

/// Checkout storage: transactions plus the read/maintenance paths that do not
/// participate in a checkout.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    type Tx: CheckoutTx;

    async fn begin(&self) -> DomainResult<Self::Tx>;

    /// Whether the authenticated principal maps to a known buyer.
    async fn buyer_exists(&self, buyer: BuyerId) -> DomainResult<bool>;

    /// Atomic stock increment (cancellations, returns, replenishment).
    async fn restock(&self, product_id: ProductId, quantity: u32) -> DomainResult<()>;

    async fn find_order(&self, id: OrderId) -> DomainResult<Option<Order>>;

    async fn orders_for_buyer(&self, buyer: BuyerId) -> DomainResult<Vec<Order>>;
}
