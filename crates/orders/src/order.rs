use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use checkout_core::{BuyerId, DomainError, DomainResult, Entity, Money, OrderId, ProductId};

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
    Shipped,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(DomainError::validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }

    /// Whether the order's line items may still change while in this status.
    pub fn lines_mutable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Shipped)
                | (Shipped, Delivered)
        )
    }
}

/// One product-quantity-price entry within an order.
///
/// `unit_price` is a snapshot of the catalog price at commit time, never the
/// client-claimed price; snapshots stay fixed for audit/billing integrity even
/// if the catalog price later changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl OrderLineItem {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("line item quantity must be positive"));
        }
        let subtotal = unit_price.checked_mul(quantity)?;
        Ok(Self {
            product_id,
            quantity,
            unit_price,
            subtotal,
        })
    }
}

/// The order aggregate: an immutable record of what was bought, at which
/// prices, by whom.
///
/// Built once by [`crate::OrderBuilder`] and persisted as a unit together with
/// its line items. State changes after creation are modeled as status
/// transitions producing a new value, never field mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    buyer_id: BuyerId,
    line_items: Vec<OrderLineItem>,
    subtotal: Money,
    shipping_cost: Money,
    total: Money,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Assemble a new pending order from already-priced line items.
    ///
    /// Subtotal and total are derived here; callers cannot supply them.
    pub fn assemble(
        id: OrderId,
        buyer_id: BuyerId,
        line_items: Vec<OrderLineItem>,
        shipping_cost: Money,
    ) -> DomainResult<Self> {
        if line_items.is_empty() {
            return Err(DomainError::validation("order must have at least one line item"));
        }
        if shipping_cost.is_negative() {
            return Err(DomainError::validation("shipping cost cannot be negative"));
        }
        let subtotal = Money::checked_sum(line_items.iter().map(|l| l.subtotal))?;
        let total = subtotal.checked_add(shipping_cost)?;
        let now = Utc::now();
        Ok(Self {
            id,
            buyer_id,
            line_items,
            subtotal,
            shipping_cost,
            total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstruct an order from persisted state. For storage adapters only.
    #[allow(clippy::too_many_arguments)]
    pub fn rehydrate(
        id: OrderId,
        buyer_id: BuyerId,
        line_items: Vec<OrderLineItem>,
        subtotal: Money,
        shipping_cost: Money,
        total: Money,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            buyer_id,
            line_items,
            subtotal,
            shipping_cost,
            total,
            status,
            created_at,
            updated_at,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn buyer_id(&self) -> BuyerId {
        self.buyer_id
    }

    pub fn line_items(&self) -> &[OrderLineItem] {
        &self.line_items
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Human-readable order number derived from the id.
    pub fn order_number(&self) -> String {
        let simple = self.id.as_uuid().simple().to_string();
        format!("ORD-{}", simple[..8].to_uppercase())
    }

    /// Produce a copy of the order in the next lifecycle status.
    pub fn with_status(&self, next: OrderStatus) -> DomainResult<Order> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::validation(format!(
                "cannot transition order from {} to {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = Utc::now();
        Ok(updated)
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
