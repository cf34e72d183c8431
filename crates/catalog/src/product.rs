use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use checkout_core::{DomainError, DomainResult, Entity, Money, ProductId};

/// Catalog product: price and stock by identifier.
///
/// Stock is mutated only through the conditional decrement/restock paths;
/// `revision` is bumped on every stock mutation so storage adapters can use it
/// as a compare-and-swap marker. Invariant: stock never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    unit_price: Money,
    stock: i64,
    revision: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        unit_price: Money,
        stock: i64,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if unit_price.is_negative() {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        if stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }
        let now = Utc::now();
        Ok(Self {
            id,
            name,
            unit_price,
            stock,
            revision: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstruct a product from persisted state. For storage adapters only.
    #[allow(clippy::too_many_arguments)]
    pub fn rehydrate(
        id: ProductId,
        name: String,
        unit_price: Money,
        stock: i64,
        revision: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            unit_price,
            stock,
            revision,
            created_at,
            updated_at,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock >= i64::from(quantity)
    }

    /// Conditional decrement: subtract `quantity` only if enough stock exists.
    ///
    /// This is the in-memory equivalent of the engine's single conditioned
    /// `UPDATE … WHERE stock >= quantity` statement. The check and the
    /// subtraction are one step; callers never compute new stock from a
    /// previously read value.
    pub fn apply_decrement(&mut self, quantity: u32) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("decrement quantity must be positive"));
        }
        let requested = i64::from(quantity);
        if self.stock < requested {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock,
            });
        }
        self.stock -= requested;
        self.revision += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Add stock back (cancellations, returns, replenishment).
    pub fn apply_restock(&mut self, quantity: u32) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("restock quantity must be positive"));
        }
        self.stock = self
            .stock
            .checked_add(i64::from(quantity))
            .ok_or_else(|| DomainError::validation("stock overflow"))?;
        self.revision += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
