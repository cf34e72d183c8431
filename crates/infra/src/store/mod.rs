//! Checkout store implementations.
//!
//! `memory` is the reference implementation with exact transactional
//! semantics, used for tests and local development. `postgres` is the
//! production adapter; it enforces the same contract with row-level
//! conditional updates instead of a store-wide lock.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
