//! Domain error model.
//!
//! The checkout taxonomy: deterministic business failures (validation,
//! lookups, stock, totals) plus the two infrastructure-shaped variants every
//! caller has to reason about — `Transient` (retryable) and `Unknown`
//! (fatal, logged, surfaced generically).

use thiserror::Error;

use crate::id::{BuyerId, ProductId};
use crate::money::Money;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed request).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested product does not exist in the catalog.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// A conditional decrement found less stock than requested.
    ///
    /// `available` is read inside the same failed attempt, not from a stale
    /// pre-check.
    #[error("insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// Client-claimed totals disagree with server-computed totals beyond the
    /// configured tolerance.
    #[error("totals mismatch: client claimed {claimed}, server computed {computed}")]
    TotalsMismatch { claimed: Money, computed: Money },

    /// The buyer referenced by the authenticated principal is unknown.
    #[error("buyer not found: {0}")]
    BuyerNotFound(BuyerId),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Timeout / connection trouble; safe to retry, no partial effect exists.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Fatal, unexpected failure. Logged in full, surfaced generically.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether a retry of the same request could succeed without any
    /// intervening change to the world.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Stable machine-readable tag for result payloads and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::ProductNotFound(_) => "product_not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::TotalsMismatch { .. } => "totals_mismatch",
            Self::BuyerNotFound(_) => "buyer_not_found",
            Self::InvalidId(_) => "validation_error",
            Self::Transient(_) => "transient_failure",
            Self::Unknown(_) => "unknown_error",
        }
    }
}
