//! Process configuration, loaded explicitly at startup.
//!
//! Nothing on the checkout path reads the environment; the engine only ever
//! sees an already-built [`CheckoutConfig`] and the pool handle derived from
//! it.

use std::time::Duration;

use thiserror::Error;

use checkout_core::Money;
use checkout_engine::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Checkout engine configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Upper bound on any single statement inside the checkout transaction.
    /// Exceeding it surfaces as a transient, retryable failure.
    pub statement_timeout: Duration,
    pub retry: RetryPolicy,
    /// Tolerance for the client-vs-server totals comparison.
    pub totals_tolerance: Money,
}

impl CheckoutConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Load from the process environment. `DATABASE_URL` is required;
    /// everything else has defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_connections = parse_or(
            &lookup,
            "CHECKOUT_MAX_CONNECTIONS",
            Self::DEFAULT_MAX_CONNECTIONS,
        )?;
        let statement_timeout_ms: u64 = parse_or(
            &lookup,
            "CHECKOUT_STATEMENT_TIMEOUT_MS",
            Self::DEFAULT_STATEMENT_TIMEOUT.as_millis() as u64,
        )?;
        let max_attempts = parse_or(
            &lookup,
            "CHECKOUT_RETRY_MAX_ATTEMPTS",
            RetryPolicy::default().max_attempts,
        )?;
        let base_backoff_ms: u64 = parse_or(
            &lookup,
            "CHECKOUT_RETRY_BACKOFF_MS",
            RetryPolicy::default().base_backoff.as_millis() as u64,
        )?;
        let tolerance_cents: i64 = parse_or(&lookup, "CHECKOUT_TOTALS_TOLERANCE_CENTS", 1)?;

        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "CHECKOUT_RETRY_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }
        if tolerance_cents < 0 {
            return Err(ConfigError::Invalid {
                var: "CHECKOUT_TOTALS_TOLERANCE_CENTS",
                reason: "cannot be negative".to_string(),
            });
        }

        Ok(Self {
            database_url,
            max_connections,
            statement_timeout: Duration::from_millis(statement_timeout_ms),
            retry: RetryPolicy {
                max_attempts,
                base_backoff: Duration::from_millis(base_backoff_ms),
                ..RetryPolicy::default()
            },
            totals_tolerance: Money::from_cents(tolerance_cents),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
