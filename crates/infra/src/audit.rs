//! Audit sinks for failed checkouts.
//!
//! Every checkout failure is recorded with the buyer, the idempotency key,
//! and the stable error kind before the result reaches the caller. Sinks are
//! infallible from the orchestrator's perspective.

use std::sync::Mutex;

use tracing::warn;

use checkout_engine::{CheckoutAudit, FailedCheckout};

/// Audit sink that writes structured log events.
///
/// The default for production: failures land in the log pipeline alongside
/// the rest of the checkout trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl CheckoutAudit for TracingAudit {
    fn record_failure(&self, failure: FailedCheckout) {
        warn!(
            buyer_id = %failure.buyer_id,
            idempotency_key = %failure.idempotency_key,
            error_kind = %failure.error_kind,
            message = %failure.message,
            "checkout failure recorded"
        );
    }
}

/// Audit sink that keeps failures in memory, for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryAudit {
    failures: Mutex<Vec<FailedCheckout>>,
}

impl InMemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<FailedCheckout> {
        self.failures.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl CheckoutAudit for InMemoryAudit {
    fn record_failure(&self, failure: FailedCheckout) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{BuyerId, IdempotencyKey};

    #[test]
    fn in_memory_audit_records_in_order() {
        let audit = InMemoryAudit::new();
        let buyer = BuyerId::new();

        audit.record_failure(FailedCheckout {
            buyer_id: buyer,
            idempotency_key: IdempotencyKey::parse("k1").unwrap(),
            error_kind: "insufficient_stock".to_string(),
            message: "insufficient stock".to_string(),
        });
        audit.record_failure(FailedCheckout {
            buyer_id: buyer,
            idempotency_key: IdempotencyKey::parse("k2").unwrap(),
            error_kind: "totals_mismatch".to_string(),
            message: "totals mismatch".to_string(),
        });

        let failures = audit.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].error_kind, "insufficient_stock");
        assert_eq!(failures[1].error_kind, "totals_mismatch");
    }
}
