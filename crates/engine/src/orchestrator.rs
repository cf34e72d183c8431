//! Checkout orchestrator: drives one checkout end to end.
//!
//! State machine: `Initiated → Validated → StockReserved → Persisted →
//! Completed`, with `Failed` reachable from any non-terminal state. Everything
//! between `Validated` and `Persisted` happens inside a single storage
//! transaction; a failure anywhere before commit rolls the whole thing back,
//! so no partial decrement or orphaned order is ever observable.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use checkout_core::{BuyerId, DomainError, DomainResult};
use checkout_orders::{CheckoutRequest, Order, OrderBuilder, OrderResult};

use crate::collaborators::{CheckoutAudit, FailedCheckout, NotificationDispatch, OrderNotification};
use crate::ledger::plan_demands;
use crate::store::{CheckoutStore, CheckoutTx, CommittedCheckout};

/// Orchestrator lifecycle states, recorded on the tracing span as the
/// checkout advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Initiated,
    Validated,
    StockReserved,
    Persisted,
    Completed,
    Failed,
}

impl CheckoutState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Initiated => "initiated",
            CheckoutState::Validated => "validated",
            CheckoutState::StockReserved => "stock_reserved",
            CheckoutState::Persisted => "persisted",
            CheckoutState::Completed => "completed",
            CheckoutState::Failed => "failed",
        }
    }
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .map(|d| d.min(self.max_backoff))
            .unwrap_or(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

enum Outcome {
    Completed(Order),
    Replayed(CommittedCheckout),
}

/// Drives checkouts against a [`CheckoutStore`].
///
/// Each checkout executes as an independent task; the orchestrator itself
/// holds no per-checkout state, so one instance serves all concurrent
/// requests.
pub struct CheckoutOrchestrator<S: CheckoutStore> {
    store: Arc<S>,
    builder: OrderBuilder,
    notifier: Arc<dyn NotificationDispatch>,
    audit: Arc<dyn CheckoutAudit>,
    retry: RetryPolicy,
}

impl<S: CheckoutStore> CheckoutOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        builder: OrderBuilder,
        notifier: Arc<dyn NotificationDispatch>,
        audit: Arc<dyn CheckoutAudit>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            builder,
            notifier,
            audit,
            retry,
        }
    }

    /// Run one checkout for the authenticated buyer.
    ///
    /// Always returns a structured [`OrderResult`]; failures are additionally
    /// recorded through the audit collaborator before returning.
    #[instrument(
        skip(self, request),
        fields(buyer_id = %buyer, idempotency_key = %request.idempotency_key)
    )]
    pub async fn checkout(&self, buyer: BuyerId, request: &CheckoutRequest) -> OrderResult {
        match self.run(buyer, request).await {
            Ok(Outcome::Completed(order)) => {
                debug!(
                    state = CheckoutState::Completed.as_str(),
                    order_id = %order.id_typed(),
                    total = %order.total(),
                    "checkout committed"
                );
                // Post-commit, outside the transaction: a delivery failure
                // must not roll back the order.
                self.notifier.dispatch(OrderNotification {
                    order_id: order.id_typed(),
                    order_number: order.order_number(),
                    buyer_id: buyer,
                    total: order.total(),
                });
                OrderResult::completed(&order)
            }
            Ok(Outcome::Replayed(prev)) => {
                debug!(order_id = %prev.order_id, "idempotency key seen before, returning committed result");
                OrderResult::replayed(prev.order_id, prev.order_number)
            }
            Err(e) => {
                match &e {
                    DomainError::Unknown(detail) => {
                        error!(state = CheckoutState::Failed.as_str(), error = %detail, "checkout failed")
                    }
                    other => {
                        warn!(state = CheckoutState::Failed.as_str(), error = %other, "checkout failed")
                    }
                }
                self.audit.record_failure(FailedCheckout {
                    buyer_id: buyer,
                    idempotency_key: request.idempotency_key.clone(),
                    error_kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                OrderResult::failed(&e)
            }
        }
    }

    async fn run(&self, buyer: BuyerId, request: &CheckoutRequest) -> DomainResult<Outcome> {
        debug!(
            state = CheckoutState::Initiated.as_str(),
            items = request.items.len(),
            "checkout started"
        );

        // Initiated -> Validated: structural checks, no transaction opened.
        request.validate()?;
        if !self.store.buyer_exists(buyer).await? {
            return Err(DomainError::BuyerNotFound(buyer));
        }
        debug!(state = CheckoutState::Validated.as_str(), "request validated");

        let mut attempt = 1u32;
        loop {
            match self.attempt(buyer, request).await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying checkout"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// One transactional attempt: replay check, pricing, decrement, persist.
    async fn attempt(&self, buyer: BuyerId, request: &CheckoutRequest) -> DomainResult<Outcome> {
        let mut tx = self.store.begin().await?;
        match self.attempt_in_tx(&mut tx, buyer, request).await {
            Ok(Outcome::Replayed(prev)) => {
                tx.rollback().await?;
                Ok(Outcome::Replayed(prev))
            }
            Ok(Outcome::Completed(order)) => {
                tx.commit().await?;
                Ok(Outcome::Completed(order))
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed checkout attempt also failed");
                }
                Err(e)
            }
        }
    }

    async fn attempt_in_tx(
        &self,
        tx: &mut S::Tx,
        buyer: BuyerId,
        request: &CheckoutRequest,
    ) -> DomainResult<Outcome> {
        if let Some(prev) = tx.committed_checkout(buyer, &request.idempotency_key).await? {
            return Ok(Outcome::Replayed(prev));
        }

        let products = tx.load_products(&request.product_ids()).await?;
        let order = self.builder.build(buyer, request, &products)?;

        let demands = plan_demands(order.line_items())?;
        tx.reserve_and_decrement(&demands).await?;
        debug!(
            state = CheckoutState::StockReserved.as_str(),
            demands = demands.len(),
            "stock reserved"
        );

        tx.insert_order(&order, &request.idempotency_key).await?;
        debug!(
            state = CheckoutState::Persisted.as_str(),
            order_id = %order.id_typed(),
            "order persisted"
        );

        Ok(Outcome::Completed(order))
    }
}
