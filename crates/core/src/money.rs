//! Money value object: integer cents, checked arithmetic.
//!
//! All monetary amounts in the engine are whole cents. Arithmetic is checked;
//! overflow surfaces as a validation error instead of wrapping.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// An amount of money in the smallest currency unit (cents).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("money addition overflowed"))
    }

    /// Multiply a unit price by a quantity.
    pub fn checked_mul(self, quantity: u32) -> DomainResult<Money> {
        self.0
            .checked_mul(i64::from(quantity))
            .map(Money)
            .ok_or_else(|| DomainError::validation("money multiplication overflowed"))
    }

    /// Absolute difference between two amounts, saturating at `i64::MAX`.
    pub fn abs_diff(self, other: Money) -> Money {
        Money(self.0.abs_diff(other.0).min(i64::MAX as u64) as i64)
    }

    /// Whether `other` agrees with `self` within `tolerance` (inclusive).
    ///
    /// Used for the defensive client-vs-server totals comparison; never for
    /// computing what gets persisted.
    pub fn within_tolerance(self, other: Money, tolerance: Money) -> bool {
        self.abs_diff(other) <= tolerance
    }

    /// Sum a sequence of amounts with overflow checking.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl ValueObject for Money {}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
