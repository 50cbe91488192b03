use crate::grid::EntityId;
use crate::traits::StateStore;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Which of the two logical stores is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSlot {
    /// Converged state, updated at the end of a time step.
    Current,
    /// Nonlinear iterate, updated inside the Newton loop.
    Iterate,
}

impl StateSlot {
    pub fn from_iterate(iterate: bool) -> Self {
        if iterate {
            StateSlot::Iterate
        } else {
            StateSlot::Current
        }
    }
}

impl fmt::Display for StateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateSlot::Current => write!(f, "state"),
            StateSlot::Iterate => write!(f, "iterate"),
        }
    }
}

/// Hash-map backed [`StateStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<(StateSlot, EntityId, String), DVector<f64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn remove(&mut self, slot: StateSlot, entity: EntityId, name: &str) -> Option<DVector<f64>> {
        self.values.remove(&(slot, entity, name.to_string()))
    }
}

impl StateStore for MemoryStore {
    fn get(&self, slot: StateSlot, entity: EntityId, name: &str) -> Option<&DVector<f64>> {
        self.values.get(&(slot, entity, name.to_string()))
    }

    fn put(&mut self, slot: StateSlot, entity: EntityId, name: &str, values: DVector<f64>) {
        self.values.insert((slot, entity, name.to_string()), values);
    }
}
