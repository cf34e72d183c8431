//! `checkout-engine` — the checkout orchestrator and its seams.
//!
//! The orchestrator drives one checkout end to end: structural validation,
//! a single transaction covering pricing + conditional stock decrement +
//! order persistence, then post-commit notification. Storage and the external
//! collaborators are traits so the engine stays independent of any one
//! backend.

pub mod collaborators;
pub mod ledger;
pub mod orchestrator;
pub mod store;

pub use collaborators::{CheckoutAudit, FailedCheckout, NotificationDispatch, OrderNotification};
pub use ledger::{plan_demands, StockDemand};
pub use orchestrator::{CheckoutOrchestrator, CheckoutState, RetryPolicy};
pub use store::{CheckoutStore, CheckoutTx, CommittedCheckout};
