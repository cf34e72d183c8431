use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use checkout_core::{DomainError, DomainResult, IdempotencyKey, Money, ProductId};

/// Payment method tag. Card/wallet authorization happens upstream; the engine
/// only records which rail was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Yape,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Yape => "yape",
            PaymentMethod::Transfer => "transfer",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "yape" => Ok(PaymentMethod::Yape),
            "transfer" => Ok(PaymentMethod::Transfer),
            other => Err(DomainError::validation(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// One requested cart entry. `client_unit_price` is what the client believes
/// the product costs; it feeds the mismatch sanity check and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub client_unit_price: Money,
}

/// A checkout submission as it arrives from the API layer.
///
/// Deliberately excludes the buyer identity: that is passed alongside by the
/// caller from an authenticated principal, so a request body can never claim
/// to be someone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    /// Opaque, pre-validated payment blob. Stored as-is, never interpreted.
    pub payment_details: JsonValue,
    pub items: Vec<RequestedItem>,
    pub client_subtotal: Money,
    pub shipping_cost: Money,
    pub client_total: Money,
    pub idempotency_key: IdempotencyKey,
}

impl CheckoutRequest {
    /// Structural validation: everything that can be checked without touching
    /// the catalog or opening a transaction.
    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("checkout requires at least one item"));
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                )));
            }
            if item.client_unit_price.is_negative() {
                return Err(DomainError::validation(format!(
                    "claimed unit price for product {} cannot be negative",
                    item.product_id
                )));
            }
        }
        if self.shipping_cost.is_negative() {
            return Err(DomainError::validation("shipping cost cannot be negative"));
        }
        if self.client_subtotal.is_negative() || self.client_total.is_negative() {
            return Err(DomainError::validation("claimed totals cannot be negative"));
        }
        Ok(())
    }

    /// Distinct product ids in cart order.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if !ids.contains(&item.product_id) {
                ids.push(item.product_id);
            }
        }
        ids
    }
}
