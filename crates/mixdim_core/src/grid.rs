//! Entities and the declaration of the variables living on them.
//!
//! A [`MixedDimLayout`] is the registry's view of a mixed-dimensional grid: an
//! ordered list of subdomains and interfaces, each with its cell/face/node
//! counts and the variables declared on it. Entities are addressed through
//! stable [`EntityId`] handles assigned once when the entity is added.

use crate::traits::GridLike;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a subdomain or interface inside a [`MixedDimLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub usize);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Subdomain,
    Interface,
}

/// Number of grid items of each kind on an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub cells: usize,
    #[serde(default)]
    pub faces: usize,
    #[serde(default)]
    pub nodes: usize,
}

impl EntityCounts {
    pub fn from_grid(grid: &impl GridLike) -> Self {
        Self {
            cells: grid.num_cells(),
            faces: grid.num_faces(),
            nodes: grid.num_nodes(),
        }
    }
}

impl GridLike for EntityCounts {
    fn num_cells(&self) -> usize {
        self.cells
    }

    fn num_faces(&self) -> usize {
        self.faces
    }

    fn num_nodes(&self) -> usize {
        self.nodes
    }
}

/// Dof multiplicities of one variable per cell, face and node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofSpec {
    #[serde(default)]
    pub cells: usize,
    #[serde(default)]
    pub faces: usize,
    #[serde(default)]
    pub nodes: usize,
}

impl DofSpec {
    /// `n` dofs per cell, nothing on faces or nodes.
    pub fn cells(n: usize) -> Self {
        Self {
            cells: n,
            ..Self::default()
        }
    }

    pub fn faces(n: usize) -> Self {
        Self {
            faces: n,
            ..Self::default()
        }
    }

    pub fn nodes(n: usize) -> Self {
        Self {
            nodes: n,
            ..Self::default()
        }
    }

    /// Number of scalar dofs this variable contributes on an entity.
    ///
    /// Interfaces only carry cell dofs; face and node multiplicities are
    /// ignored there.
    pub fn width(&self, kind: EntityKind, counts: &EntityCounts) -> usize {
        match kind {
            EntityKind::Subdomain => {
                counts.cells * self.cells + counts.faces * self.faces + counts.nodes * self.nodes
            }
            EntityKind::Interface => counts.cells * self.cells,
        }
    }
}

/// A variable declared on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(default)]
    pub dofs: DofSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub kind: EntityKind,
    #[serde(default)]
    pub name: String,
    pub counts: EntityCounts,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
}

/// Ordered declaration of entities and their variables.
///
/// The id of an entity is its position in `entities`, so ids are stable for
/// the lifetime of the layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixedDimLayout {
    pub entities: Vec<EntityDecl>,
}

impl MixedDimLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subdomain(&mut self, name: &str, grid: &impl GridLike) -> EntityId {
        self.push(EntityKind::Subdomain, name, EntityCounts::from_grid(grid))
    }

    /// Adds an interface grid. Face and node counts are dropped.
    pub fn add_interface(&mut self, name: &str, grid: &impl GridLike) -> EntityId {
        let counts = EntityCounts {
            cells: grid.num_cells(),
            faces: 0,
            nodes: 0,
        };
        self.push(EntityKind::Interface, name, counts)
    }

    fn push(&mut self, kind: EntityKind, name: &str, counts: EntityCounts) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(EntityDecl {
            kind,
            name: name.to_string(),
            counts,
            variables: Vec::new(),
        });
        id
    }

    /// Declares `name` on `entity`. Redeclaring a name replaces its dof spec
    /// but keeps the original declaration position.
    ///
    /// # Panics
    /// If `entity` does not belong to this layout.
    pub fn declare(&mut self, entity: EntityId, name: &str, dofs: DofSpec) {
        let variables = &mut self.entities[entity.0].variables;
        match variables.iter_mut().find(|v| v.name == name) {
            Some(existing) => existing.dofs = dofs,
            None => variables.push(VariableDecl {
                name: name.to_string(),
                dofs,
            }),
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityDecl> {
        self.entities.get(id.0)
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.entity(id).map(|e| e.kind)
    }

    pub fn subdomains(&self) -> impl Iterator<Item = (EntityId, &EntityDecl)> {
        self.iter_kind(EntityKind::Subdomain)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = (EntityId, &EntityDecl)> {
        self.iter_kind(EntityKind::Interface)
    }

    fn iter_kind(&self, kind: EntityKind) -> impl Iterator<Item = (EntityId, &EntityDecl)> {
        self.entities
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.kind == kind)
            .map(|(i, e)| (EntityId(i), e))
    }
}
