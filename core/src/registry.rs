//! Registry of circuit breakers for fleet-wide introspection
//!
//! Breakers of any result/fault type can share one registry: entries are
//! stored as [`CircuitView`] trait objects. Entries are never removed.

use crate::{State, circuit::CircuitView, errors::RegistryError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// Thread-safe registry of circuit breakers keyed by identifier
#[derive(Default)]
pub struct CircuitRegistry {
    circuits: RwLock<HashMap<String, Arc<dyn CircuitView>>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breaker; fails without touching the registry if its id is taken
    pub fn register<C>(&self, circuit: Arc<C>) -> Result<(), RegistryError>
    where
        C: CircuitView + 'static,
    {
        let mut circuits = self.circuits.write();
        match circuits.entry(circuit.id().to_string()) {
            Entry::Occupied(entry) => Err(RegistryError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(circuit = %entry.key(), "circuit registered");
                entry.insert(circuit);
                Ok(())
            }
        }
    }

    /// Look up a breaker by identifier
    pub fn get(&self, id: &str) -> Option<Arc<dyn CircuitView>> {
        self.circuits.read().get(id).cloned()
    }

    /// Snapshot of every registered breaker, in no particular order
    pub fn get_circuits(&self) -> Vec<Arc<dyn CircuitView>> {
        self.circuits.read().values().cloned().collect()
    }

    /// Breakers whose effective state is open right now
    ///
    /// Half-open breakers are not included: they admit trial calls.
    pub fn get_open_circuits(&self) -> Vec<Arc<dyn CircuitView>> {
        self.circuits
            .read()
            .values()
            .filter(|circuit| circuit.state() == State::Open)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.circuits.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.read().is_empty()
    }
}

impl std::fmt::Debug for CircuitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let circuits = self.circuits.read();
        let mut ids: Vec<&str> = circuits.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("CircuitRegistry")
            .field("circuits", &ids)
            .finish()
    }
}
