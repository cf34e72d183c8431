//! Read access to the catalog for collaborators outside the checkout
//! transaction (availability pre-checks, reporting reads).

use async_trait::async_trait;

use checkout_core::{DomainResult, ProductId};

use crate::product::Product;

/// Read-only catalog access by product identifier.
///
/// Reads through this trait are best-effort snapshots: a concurrent checkout
/// may commit between the read and any later decision. Correctness only ever
/// rests on the conditional decrement inside the checkout transaction.
#[async_trait]
pub trait CatalogAccessor: Send + Sync {
    /// Look up one product. `Ok(None)` when the id is unknown.
    async fn product(&self, id: ProductId) -> DomainResult<Option<Product>>;

    /// Look up many products. Unknown ids are silently omitted; callers that
    /// care about missing products compare against the requested set.
    async fn products(&self, ids: &[ProductId]) -> DomainResult<Vec<Product>>;

    /// Best-effort availability pre-check for fast-fail UX. Never
    /// authoritative.
    async fn check_availability(&self, id: ProductId, quantity: u32) -> DomainResult<bool> {
        Ok(self
            .product(id)
            .await?
            .map(|p| p.has_stock_for(quantity))
            .unwrap_or(false))
    }
}
