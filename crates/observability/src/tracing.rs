//! Tracing/logging initialization.
//!
//! Structured JSON events on stdout, filtered via `RUST_LOG`. Checkout spans
//! carry `buyer_id` and `idempotency_key` fields, so one grep follows a
//! single checkout through validation, reservation, and commit.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
