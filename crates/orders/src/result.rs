use serde::{Deserialize, Serialize};

use checkout_core::{DomainError, OrderId};

use crate::order::Order;

/// What the caller gets back from a checkout, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<OrderId>,
    pub order_number: Option<String>,
    pub message: String,
    pub error_kind: Option<String>,
}

impl OrderResult {
    pub fn completed(order: &Order) -> Self {
        Self {
            success: true,
            order_id: Some(order.id_typed()),
            order_number: Some(order.order_number()),
            message: "order placed".to_string(),
            error_kind: None,
        }
    }

    /// Replay of an already-committed checkout (idempotency key collision).
    pub fn replayed(order_id: OrderId, order_number: String) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            order_number: Some(order_number),
            message: "order already placed".to_string(),
            error_kind: None,
        }
    }

    pub fn failed(error: &DomainError) -> Self {
        // Unknown errors are logged in full elsewhere; the caller only sees a
        // generic message.
        let message = match error {
            DomainError::Unknown(_) => "checkout failed, please try again".to_string(),
            other => other.to_string(),
        };
        Self {
            success: false,
            order_id: None,
            order_number: None,
            message,
            error_kind: Some(error.kind().to_string()),
        }
    }
}
