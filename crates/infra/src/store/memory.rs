//! In-memory checkout store with real transactional semantics.
//!
//! `begin()` takes the store-wide lock for the lifetime of the transaction
//! and snapshots the state; a transaction that is dropped or rolled back
//! restores the snapshot, so partial decrements are never observable — the
//! same contract the Postgres adapter gets from its database transaction.
//! Serialization is store-wide here rather than per row; that is coarser than
//! production but indistinguishable through the trait.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use checkout_catalog::{CatalogAccessor, Product};
use checkout_core::{BuyerId, DomainError, DomainResult, IdempotencyKey, OrderId, ProductId};
use checkout_engine::{CheckoutStore, CheckoutTx, CommittedCheckout, StockDemand};
use checkout_orders::Order;

#[derive(Debug, Default, Clone)]
struct StoreState {
    products: BTreeMap<ProductId, Product>,
    buyers: HashSet<BuyerId>,
    orders: HashMap<OrderId, Order>,
    checkout_keys: HashMap<(BuyerId, IdempotencyKey), CommittedCheckout>,
}

/// Reference store for tests and local development.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckoutStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryCheckoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a catalog product. Replaces any existing row with the same id.
    pub async fn insert_product(&self, product: Product) {
        let mut state = self.state.lock().await;
        state.products.insert(product.id_typed(), product);
    }

    pub async fn register_buyer(&self, buyer: BuyerId) {
        let mut state = self.state.lock().await;
        state.buyers.insert(buyer);
    }

    /// Number of persisted orders, across all buyers.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

/// One open transaction. Holds the store lock; effects become permanent on
/// `commit` and are otherwise undone from the snapshot.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<StoreState>,
    snapshot: Option<StoreState>,
}

impl InMemoryTx {
    fn finish(mut self, keep_changes: bool) {
        if keep_changes {
            self.snapshot = None;
        }
        // Drop runs next and restores the snapshot if one is left.
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl CheckoutTx for InMemoryTx {
    async fn committed_checkout(
        &mut self,
        buyer: BuyerId,
        key: &IdempotencyKey,
    ) -> DomainResult<Option<CommittedCheckout>> {
        Ok(self.guard.checkout_keys.get(&(buyer, key.clone())).cloned())
    }

    async fn load_products(&mut self, ids: &[ProductId]) -> DomainResult<Vec<Product>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.guard.products.get(id).cloned())
            .collect())
    }

    async fn reserve_and_decrement(&mut self, demands: &[StockDemand]) -> DomainResult<()> {
        for demand in demands {
            let product = self
                .guard
                .products
                .get_mut(&demand.product_id)
                .ok_or(DomainError::ProductNotFound(demand.product_id))?;
            // Check-and-subtract in one step; an error here propagates and
            // the whole transaction's changes are restored from the snapshot.
            product.apply_decrement(demand.quantity)?;
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order, key: &IdempotencyKey) -> DomainResult<()> {
        let slot = (order.buyer_id(), key.clone());
        if self.guard.checkout_keys.contains_key(&slot) {
            return Err(DomainError::transient(
                "idempotency key committed concurrently",
            ));
        }
        self.guard.checkout_keys.insert(
            slot,
            CommittedCheckout {
                order_id: order.id_typed(),
                order_number: order.order_number(),
            },
        );
        self.guard.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }

    async fn commit(self) -> DomainResult<()> {
        self.finish(true);
        Ok(())
    }

    async fn rollback(self) -> DomainResult<()> {
        self.finish(false);
        Ok(())
    }
}

#[async_trait]
impl CheckoutStore for InMemoryCheckoutStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> DomainResult<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = Some(guard.clone());
        Ok(InMemoryTx { guard, snapshot })
    }

    async fn buyer_exists(&self, buyer: BuyerId) -> DomainResult<bool> {
        Ok(self.state.lock().await.buyers.contains(&buyer))
    }

    async fn restock(&self, product_id: ProductId, quantity: u32) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(DomainError::ProductNotFound(product_id))?;
        product.apply_restock(quantity)
    }

    async fn find_order(&self, id: OrderId) -> DomainResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn orders_for_buyer(&self, buyer: BuyerId) -> DomainResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.buyer_id() == buyer)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at());
        Ok(orders)
    }
}

#[async_trait]
impl CatalogAccessor for InMemoryCheckoutStore {
    async fn product(&self, id: ProductId) -> DomainResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn products(&self, ids: &[ProductId]) -> DomainResult<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }
}
