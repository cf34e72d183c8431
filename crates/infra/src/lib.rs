//! Infrastructure layer: storage adapters, config, collaborator wiring.

use std::sync::Arc;

use checkout_engine::{CheckoutAudit, CheckoutOrchestrator, CheckoutStore, NotificationDispatch};
use checkout_orders::OrderBuilder;

pub mod audit;
pub mod config;
pub mod notify;
pub mod store;

mod integration_tests;

/// Assemble an orchestrator from loaded configuration and collaborators.
pub fn build_orchestrator<S: CheckoutStore>(
    store: Arc<S>,
    config: &config::CheckoutConfig,
    notifier: Arc<dyn NotificationDispatch>,
    audit: Arc<dyn CheckoutAudit>,
) -> CheckoutOrchestrator<S> {
    CheckoutOrchestrator::new(
        store,
        OrderBuilder::new(config.totals_tolerance),
        notifier,
        audit,
        config.retry.clone(),
    )
}

pub use audit::{InMemoryAudit, TracingAudit};
pub use config::{CheckoutConfig, ConfigError};
pub use notify::{NotificationDelivery, RecordingNotifier, SpawnedNotifier};
pub use store::memory::InMemoryCheckoutStore;
#[cfg(feature = "postgres")]
pub use store::postgres::PostgresCheckoutStore;
