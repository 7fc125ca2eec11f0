//! Callback system for circuit breaker state transitions

use crate::circuit::CircuitView;
use std::sync::Arc;

/// What pushed a circuit open
#[derive(Debug)]
pub enum Trip<'a, T, E> {
    /// The operation returned a fault that the classifier counted
    Fault(&'a E),
    /// The operation returned a value that `detect_error` flagged
    Detected(&'a T),
}

pub type OpenCallback<T, E> = Arc<dyn Fn(&dyn CircuitView, Trip<'_, T, E>) + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn(&dyn CircuitView) + Send + Sync>;

/// Callbacks for circuit breaker events
pub struct Callbacks<T, E> {
    pub on_open: Option<OpenCallback<T, E>>,
    pub on_close: Option<CloseCallback>,
}

impl<T, E> Callbacks<T, E> {
    pub fn new() -> Self {
        Self {
            on_open: None,
            on_close: None,
        }
    }

    pub fn trigger_open(&self, circuit: &dyn CircuitView, trip: Trip<'_, T, E>) {
        if let Some(ref callback) = self.on_open {
            callback(circuit, trip);
        }
    }

    pub fn trigger_close(&self, circuit: &dyn CircuitView) {
        if let Some(ref callback) = self.on_close {
            callback(circuit);
        }
    }
}

impl<T, E> Clone for Callbacks<T, E> {
    fn clone(&self) -> Self {
        Self {
            on_open: self.on_open.clone(),
            on_close: self.on_close.clone(),
        }
    }
}

impl<T, E> Default for Callbacks<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for Callbacks<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}
