use crate::grid::EntityId;
use crate::state::StateSlot;
use nalgebra::DVector;

/// A grid-like entity that can carry degrees of freedom.
///
/// Subdomain grids report cells, faces and nodes. Interface (mortar) grids only
/// carry cell dofs, so they may leave the face and node counts at zero.
pub trait GridLike {
    /// Number of cells in the grid.
    fn num_cells(&self) -> usize;

    /// Number of faces in the grid.
    fn num_faces(&self) -> usize {
        0
    }

    /// Number of nodes in the grid.
    fn num_nodes(&self) -> usize {
        0
    }
}

/// Per-entity named storage for variable values.
///
/// Two logical stores are addressed through [`StateSlot`]: the converged state
/// and the current nonlinear iterate.
pub trait StateStore {
    /// Returns the stored values of `name` on `entity`, if any.
    fn get(&self, slot: StateSlot, entity: EntityId, name: &str) -> Option<&DVector<f64>>;

    /// Stores `values` for `name` on `entity`, replacing any previous entry.
    fn put(&mut self, slot: StateSlot, entity: EntityId, name: &str, values: DVector<f64>);
}
