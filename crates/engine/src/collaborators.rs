//! Seams to the external collaborators: notification dispatch and audit.
//!
//! Both are fire-and-forget from the orchestrator's point of view. A
//! notification failure never rolls back a committed order, and an audit
//! failure never blocks returning the primary result, so neither trait
//! returns an error to the caller.

use checkout_core::{BuyerId, IdempotencyKey, Money, OrderId};

/// Payload handed to the notification collaborator after a checkout commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNotification {
    pub order_id: OrderId,
    pub order_number: String,
    pub buyer_id: BuyerId,
    pub total: Money,
}

/// Post-commit notification dispatch. Implementations enqueue and return;
/// delivery and its retries happen off the checkout path.
pub trait NotificationDispatch: Send + Sync {
    fn dispatch(&self, notification: OrderNotification);
}

/// Record of a checkout that failed before commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheckout {
    pub buyer_id: BuyerId,
    pub idempotency_key: IdempotencyKey,
    pub error_kind: String,
    pub message: String,
}

/// Audit sink for failed checkouts. Every failure is recorded before the
/// result goes back to the caller.
pub trait CheckoutAudit: Send + Sync {
    fn record_failure(&self, failure: FailedCheckout);
}
