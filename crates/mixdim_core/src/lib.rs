pub mod autodiff;
pub mod dof_manager;
pub mod error;
pub mod grid;
pub mod state;
/// The `mixdim_core` crate provides the discretization plumbing for coupled
/// problems posed on mixed-dimensional grids.
///
/// Key components:
/// - **Autodiff**: `AdArray` (value plus sparse Jacobian), seeding via `init_ad_arrays`,
///   and the elementary function library in `autodiff::functions`.
/// - **Grid**: `MixedDimLayout`, the ordered declaration of subdomains, interfaces and their variables.
/// - **Dof manager**: `DofManager`, mapping (entity, variable) pairs to blocks of the global unknown vector.
/// - **State**: the `StateStore` seam and an in-memory implementation.
pub mod traits;

pub use autodiff::{init_ad_array, init_ad_arrays, AdArray, Value};
pub use dof_manager::{DofManager, Variable};
pub use error::{Error, Result};
pub use grid::{DofSpec, EntityId, EntityKind, MixedDimLayout};
pub use state::{MemoryStore, StateSlot};
pub use traits::{GridLike, StateStore};
