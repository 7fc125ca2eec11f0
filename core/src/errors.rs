//! Error types for circuit breaker operations

use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors returned from [`CircuitBreaker::call`](crate::CircuitBreaker::call)
///
/// `Open` means the breaker refused to run the operation; `Execution` carries
/// the operation's own fault, untouched.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Circuit is open, the operation was not attempted
    #[error(
        "circuit '{circuit}' OPEN ({error_count} errors, {:.3} sec remaining)",
        .retry_after.as_secs_f64()
    )]
    Open {
        circuit: String,
        /// Instant at which trial calls will be admitted again, if representable
        open_until: Option<Instant>,
        /// Time left until `open_until`, measured at rejection
        /// (`Duration::MAX` when there is no such instant)
        retry_after: Duration,
        error_count: usize,
    },
    /// The wrapped operation failed
    #[error(transparent)]
    Execution(E),
}

impl<E> CircuitError<E> {
    /// True when the breaker refused to invoke the operation
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// The operation's fault, if the operation ran and failed
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }
}

/// Invalid breaker configuration, reported at construction time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown circuit breaker strategy '{0}'")]
    UnknownStrategy(String),
    #[error("{0} must be greater than zero")]
    ZeroThreshold(&'static str),
    #[error("recovery timeout must be a finite, non-negative number of seconds (got {0})")]
    InvalidRecoveryTimeout(f64),
    #[error("jitter factor must be within 0.0..=1.0 (got {0})")]
    InvalidJitter(f64),
}

/// Errors raised by [`CircuitRegistry`](crate::CircuitRegistry)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("circuit '{0}' is already registered")]
    Duplicate(String),
}
