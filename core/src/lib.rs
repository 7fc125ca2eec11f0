//! breakerbox - circuit breakers with pluggable counting strategies
//!
//! This crate provides:
//! - A circuit breaker that refuses calls while open and admits trial calls
//!   once a recovery timeout has passed (Closed → Open → HalfOpen → Closed)
//! - Two counting strategies: `SingleReset` and `NetError`
//! - Category-based fault classification with allow-lists and deny-lists
//! - Detection of errors signalled through return values
//! - A registry for inspecting a fleet of breakers
//!
//! Half-open is never stored: it is derived on every read from the time the
//! circuit last opened, so the observed state cannot drift from the clock.
//!
//! # Example
//!
//! ```rust
//! use breakerbox::{CircuitBreaker, CircuitRegistry, State};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let circuit: Arc<CircuitBreaker<String, std::io::Error>> = Arc::new(
//!     CircuitBreaker::builder("payment_api")
//!         .error_threshold(2)
//!         .recovery_timeout(Duration::from_secs(30))
//!         .allow("io.not_found")
//!         .on_open(|circuit, _trip| println!("Circuit {} opened!", circuit.id()))
//!         .build()
//!         .expect("valid config"),
//! );
//!
//! let registry = CircuitRegistry::new();
//! registry.register(circuit.clone()).expect("unique id");
//!
//! // Execute with circuit protection
//! let result = circuit.call(|| Ok("charged".to_string()));
//! assert_eq!(result.unwrap(), "charged");
//!
//! for _ in 0..2 {
//!     let _ = circuit.call(|| Err(std::io::Error::other("gateway down")));
//! }
//! assert_eq!(circuit.state(), State::Open);
//! assert_eq!(registry.get_open_circuits().len(), 1);
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod clock;
pub mod errors;
pub mod registry;
pub mod strategy;
pub mod wrap;

pub use builder::CircuitBuilder;
pub use callbacks::{Callbacks, Trip};
pub use circuit::{CircuitBreaker, CircuitView, Config};
pub use classifier::{
    Category, DefaultClassifier, FailureClassifier, FailureContext, Fault, ListClassifier,
    PredicateClassifier,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::{CircuitError, ConfigError, RegistryError};
pub use registry::CircuitRegistry;
pub use strategy::{Strategy, StrategyKind};
pub use wrap::{Guarded, circuit};

use serde::{Deserialize, Serialize};

/// Effective state of a circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Calls flow through and outcomes are counted
    Closed,
    /// Calls are rejected without invoking the operation
    Open,
    /// Recovery window elapsed; trial calls are admitted
    HalfOpen,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "CLOSED",
            State::Open => "OPEN",
            State::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
