//! Bind an operation to a dedicated circuit breaker
//!
//! ```rust
//! use breakerbox::{CircuitBreaker, circuit};
//!
//! fn lookup(user_id: u64) -> Result<String, std::io::Error> {
//!     Ok(format!("user-{user_id}"))
//! }
//!
//! let guarded = circuit(lookup, CircuitBreaker::builder("users").error_threshold(3)).unwrap();
//! assert_eq!(guarded.call(7).unwrap(), "user-7");
//! ```

use crate::{
    builder::CircuitBuilder,
    circuit::CircuitBreaker,
    classifier::Fault,
    errors::{CircuitError, ConfigError},
};
use std::sync::Arc;

/// An operation bound to its own circuit breaker
///
/// Multiple arguments are passed as a tuple.
pub struct Guarded<F, T, E> {
    operation: F,
    breaker: Arc<CircuitBreaker<T, E>>,
}

/// Wrap `operation` with a breaker built from `builder`
///
/// Configuration errors surface here, never at call time.
pub fn circuit<F, A, T, E>(
    operation: F,
    builder: CircuitBuilder<T, E>,
) -> Result<Guarded<F, T, E>, ConfigError>
where
    F: Fn(A) -> Result<T, E>,
    E: Fault,
{
    Ok(Guarded {
        operation,
        breaker: Arc::new(builder.build()?),
    })
}

impl<F, T, E> Guarded<F, T, E> {
    /// Call the operation through the breaker
    pub fn call<A>(&self, args: A) -> Result<T, CircuitError<E>>
    where
        F: Fn(A) -> Result<T, E>,
        E: Fault,
    {
        self.breaker.call(|| (self.operation)(args))
    }

    /// The dedicated breaker, e.g. for registering it
    pub fn breaker(&self) -> &Arc<CircuitBreaker<T, E>> {
        &self.breaker
    }

    /// Turn into a plain closure with the operation's calling convention
    pub fn into_fn<A>(self) -> impl Fn(A) -> Result<T, CircuitError<E>>
    where
        F: Fn(A) -> Result<T, E>,
        E: Fault,
    {
        move |args| self.call(args)
    }
}

impl<F, T, E> std::fmt::Debug for Guarded<F, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded")
            .field("breaker", &self.breaker)
            .finish()
    }
}
