//! Degree-of-freedom bookkeeping for mixed-dimensional problems.
//!
//! The [`DofManager`] lays out every (entity, variable) pair of a
//! [`MixedDimLayout`] as one contiguous block of a global unknown vector and
//! moves values between that vector and a [`StateStore`].
//!
//! Blocks are numbered in registration order: all subdomains first, then all
//! interfaces, each entity's variables in declaration order. No reordering is
//! ever applied, so callers may rely on block positions.

use crate::error::{Error, Result};
use crate::grid::{EntityId, EntityKind, MixedDimLayout};
use crate::state::StateSlot;
use crate::traits::StateStore;
use log::{debug, trace};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Range;

/// A named variable on a specific entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub entity: EntityId,
    pub name: String,
}

impl Variable {
    pub fn new(entity: EntityId, name: &str) -> Self {
        Self {
            entity,
            name: name.to_string(),
        }
    }
}

/// Half-open range `[start, end)` of global dof indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: usize,
    pub end: usize,
}

impl BlockRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Grouping of [`DofManager::block_ranges`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    None,
    Entities,
    Variables,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockRanges {
    Flat(Vec<(Variable, BlockRange)>),
    ByEntity(Vec<(EntityId, Vec<(String, BlockRange)>)>),
    ByVariable(Vec<(String, Vec<(EntityId, BlockRange)>)>),
}

#[derive(Debug, Clone)]
struct Block {
    entity: EntityId,
    variable: String,
    width: usize,
}

#[derive(Debug, Clone)]
struct EntityInfo {
    kind: EntityKind,
    name: String,
}

/// Registry of dof blocks.
///
/// Built once from a layout snapshot; later changes to the layout require a new
/// manager.
#[derive(Debug, Clone)]
pub struct DofManager {
    blocks: Vec<Block>,
    block_dof: HashMap<(EntityId, String), usize>,
    /// Prefix sums of block widths, one longer than `blocks`.
    dof_start: Vec<usize>,
    entities: HashMap<EntityId, EntityInfo>,
    /// Entities in registry order: subdomains, then interfaces.
    entity_order: Vec<EntityId>,
}

impl DofManager {
    pub fn new(layout: &MixedDimLayout) -> Self {
        let mut blocks = Vec::new();
        let mut block_dof = HashMap::new();
        let mut entities = HashMap::new();
        let mut entity_order = Vec::new();

        for (id, decl) in layout.subdomains().chain(layout.interfaces()) {
            entities.insert(
                id,
                EntityInfo {
                    kind: decl.kind,
                    name: decl.name.clone(),
                },
            );
            entity_order.push(id);
            for var in &decl.variables {
                block_dof.insert((id, var.name.clone()), blocks.len());
                blocks.push(Block {
                    entity: id,
                    variable: var.name.clone(),
                    width: var.dofs.width(decl.kind, &decl.counts),
                });
            }
        }

        let mut dof_start = Vec::with_capacity(blocks.len() + 1);
        dof_start.push(0);
        for block in &blocks {
            let last = dof_start[dof_start.len() - 1];
            dof_start.push(last + block.width);
        }

        let manager = Self {
            blocks,
            block_dof,
            dof_start,
            entities,
            entity_order,
        };
        debug!(
            "dof manager: {} blocks, {} dofs",
            manager.num_blocks(),
            manager.num_dofs()
        );
        manager
    }

    /// Total size of the global unknown vector.
    pub fn num_dofs(&self) -> usize {
        self.dof_start[self.dof_start.len() - 1]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Widths of all blocks in block order.
    pub fn block_widths(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.width).collect()
    }

    pub fn block_id(&self, entity: EntityId, variable: &str) -> Result<usize> {
        self.block_dof
            .get(&(entity, variable.to_string()))
            .copied()
            .ok_or_else(|| Error::UnknownBlock {
                entity,
                variable: variable.to_string(),
            })
    }

    pub fn block_range(&self, entity: EntityId, variable: &str) -> Result<BlockRange> {
        let id = self.block_id(entity, variable)?;
        Ok(self.range_of(id))
    }

    fn range_of(&self, block: usize) -> BlockRange {
        BlockRange {
            start: self.dof_start[block],
            end: self.dof_start[block + 1],
        }
    }

    /// Global indices of the dofs of `variable` on `entity`.
    pub fn grid_and_variable_to_dofs(&self, entity: EntityId, variable: &str) -> Result<Range<usize>> {
        Ok(self.block_range(entity, variable)?.indices())
    }

    /// Concatenated dof indices of `variables`, in the order given.
    pub fn dofs_of(&self, variables: &[Variable]) -> Result<Vec<usize>> {
        let mut dofs = Vec::new();
        for var in variables {
            dofs.extend(self.grid_and_variable_to_dofs(var.entity, &var.name)?);
        }
        Ok(dofs)
    }

    /// Entity and variable owning the global dof `index`.
    pub fn dof_to_grid_and_variable(&self, index: i64) -> Result<(EntityId, &str)> {
        if index < 0 {
            return Err(Error::NegativeIndex(index));
        }
        let index = index as usize;
        let size = self.num_dofs();
        if index >= size {
            return Err(Error::IndexOutOfRange { index, size });
        }
        // last block whose start is <= index; zero-width blocks are skipped
        let block = self.dof_start.partition_point(|&start| start <= index) - 1;
        let b = &self.blocks[block];
        Ok((b.entity, b.variable.as_str()))
    }

    /// Dofs of the named variables on every entity carrying them.
    ///
    /// Entity-major: entities in registry order, and for each entity the
    /// variables in the order given.
    pub fn dofs_of_variables(&self, names: &[&str]) -> Vec<usize> {
        let mut dofs = Vec::new();
        for &entity in &self.entity_order {
            for name in names {
                if let Ok(range) = self.block_range(entity, name) {
                    dofs.extend(range.indices());
                }
            }
        }
        dofs
    }

    /// Row-selection matrix extracting [`Self::dofs_of_variables`] from a global vector.
    pub fn projection(&self, names: &[&str]) -> CsrMatrix<f64> {
        let dofs = self.dofs_of_variables(names);
        let mut coo = CooMatrix::new(dofs.len(), self.num_dofs());
        for (row, &col) in dofs.iter().enumerate() {
            coo.push(row, col, 1.0);
        }
        CsrMatrix::from(&coo)
    }

    /// Block ids matching the selection, in block order. `None` selects everything.
    fn selected_blocks<'a>(
        &'a self,
        entities: Option<&'a [EntityId]>,
        variables: Option<&'a [&'a str]>,
    ) -> impl Iterator<Item = usize> + 'a {
        self.blocks.iter().enumerate().filter_map(move |(id, block)| {
            let entity_ok = entities.map_or(true, |es| es.contains(&block.entity));
            let variable_ok = variables.map_or(true, |vs| vs.contains(&block.variable.as_str()));
            (entity_ok && variable_ok).then_some(id)
        })
    }

    fn default_entities(&self) -> Vec<EntityId> {
        let mut seen = BTreeSet::new();
        self.blocks
            .iter()
            .filter(|b| seen.insert(b.entity))
            .map(|b| b.entity)
            .collect()
    }

    fn default_variables(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.blocks
            .iter()
            .filter(|b| seen.insert(b.variable.clone()))
            .map(|b| b.variable.clone())
            .collect()
    }

    /// Block ranges of the selected (entity, variable) pairs.
    ///
    /// Missing selections default to every entity and variable that owns a
    /// block. Pairs without a block are skipped; an entity (or variable) group
    /// may therefore be empty.
    pub fn block_ranges(
        &self,
        entities: Option<&[EntityId]>,
        variables: Option<&[&str]>,
        sort_by: SortBy,
    ) -> BlockRanges {
        let entities = entities.map_or_else(|| self.default_entities(), <[EntityId]>::to_vec);
        let variables: Vec<String> = variables.map_or_else(
            || self.default_variables(),
            |vs| vs.iter().map(|v| v.to_string()).collect(),
        );

        match sort_by {
            SortBy::Entities => BlockRanges::ByEntity(
                entities
                    .iter()
                    .map(|&e| {
                        let ranges = variables
                            .iter()
                            .filter_map(|v| self.block_range(e, v).ok().map(|r| (v.clone(), r)))
                            .collect();
                        (e, ranges)
                    })
                    .collect(),
            ),
            SortBy::Variables => BlockRanges::ByVariable(
                variables
                    .iter()
                    .map(|v| {
                        let ranges = entities
                            .iter()
                            .filter_map(|&e| self.block_range(e, v).ok().map(|r| (e, r)))
                            .collect();
                        (v.clone(), ranges)
                    })
                    .collect(),
            ),
            SortBy::None => {
                let mut pairs = Vec::new();
                for &e in &entities {
                    for v in &variables {
                        if let Ok(range) = self.block_range(e, v) {
                            pairs.push((Variable::new(e, v), range));
                        }
                    }
                }
                BlockRanges::Flat(pairs)
            }
        }
    }

    /// Text rendering of [`Self::block_ranges`]. Grouped reports list
    /// variables alphabetically, ignoring case.
    pub fn block_range_report(
        &self,
        entities: Option<&[EntityId]>,
        variables: Option<&[&str]>,
        sort_by: SortBy,
    ) -> String {
        let by_name = |a: &String, b: &String| a.to_lowercase().cmp(&b.to_lowercase());
        let mut s = String::new();
        match self.block_ranges(entities, variables, sort_by) {
            BlockRanges::ByEntity(groups) => {
                for (entity, mut ranges) in groups {
                    s += &format!("{}\n", self.entity_label(entity));
                    ranges.sort_by(|a, b| by_name(&a.0, &b.0));
                    for (var, r) in ranges {
                        s += &format!("\tVariable: {var}. Range: ({}, {})\n", r.start, r.end);
                    }
                    s += "\n";
                }
            }
            BlockRanges::ByVariable(mut groups) => {
                groups.sort_by(|a, b| by_name(&a.0, &b.0));
                for (var, ranges) in groups {
                    s += &format!("Variable {var}\n");
                    for (entity, r) in ranges {
                        s += &format!(
                            "\t{} Range: ({}, {})\n",
                            self.entity_label(entity),
                            r.start,
                            r.end
                        );
                    }
                    s += "\n";
                }
            }
            BlockRanges::Flat(pairs) => {
                for (var, r) in pairs {
                    s += &format!(
                        "{}, variable {}. Range: ({}, {})\n",
                        self.entity_label(var.entity),
                        var.name,
                        r.start,
                        r.end
                    );
                }
            }
        }
        s
    }

    fn entity_label(&self, entity: EntityId) -> String {
        match self.entities.get(&entity) {
            Some(EntityInfo {
                kind: EntityKind::Subdomain,
                name,
            }) => format!("Grid with name {name}"),
            Some(EntityInfo {
                kind: EntityKind::Interface,
                name,
            }) => format!("Interface with name {name}"),
            None => format!("Unknown {entity}"),
        }
    }

    /// Writes the blocks of `values` into `store`.
    ///
    /// With `additive` the block is added to the stored value, which must
    /// already exist. Otherwise it replaces it. `to_iterate` selects the
    /// iterate slot instead of the state.
    pub fn distribute_variable<S: StateStore + ?Sized>(
        &self,
        store: &mut S,
        values: &DVector<f64>,
        entities: Option<&[EntityId]>,
        variables: Option<&[&str]>,
        additive: bool,
        to_iterate: bool,
    ) -> Result<()> {
        if values.len() != self.num_dofs() {
            return Err(Error::shape("distribute_variable", self.num_dofs(), values.len()));
        }
        let slot = StateSlot::from_iterate(to_iterate);
        for id in self.selected_blocks(entities, variables) {
            let block = &self.blocks[id];
            let range = self.range_of(id);
            let local = values.rows(range.start, range.len()).into_owned();
            trace!(
                "distribute {} on {} -> {slot} ({} dofs, additive={additive})",
                block.variable,
                block.entity,
                range.len()
            );
            let updated = if additive {
                let current = self.stored(store, slot, block)?;
                if current.len() != local.len() {
                    return Err(Error::shape("additive distribution", local.len(), current.len()));
                }
                current + local
            } else {
                local
            };
            store.put(slot, block.entity, &block.variable, updated);
        }
        Ok(())
    }

    /// Gathers stored values into a global vector. Unselected blocks stay zero.
    pub fn assemble_variable<S: StateStore + ?Sized>(
        &self,
        store: &S,
        entities: Option<&[EntityId]>,
        variables: Option<&[&str]>,
        from_iterate: bool,
    ) -> Result<DVector<f64>> {
        let slot = StateSlot::from_iterate(from_iterate);
        let mut values = DVector::zeros(self.num_dofs());
        for id in self.selected_blocks(entities, variables) {
            let block = &self.blocks[id];
            let range = self.range_of(id);
            let stored = self.stored(store, slot, block)?;
            if stored.len() != range.len() {
                return Err(Error::shape("assemble_variable", range.len(), stored.len()));
            }
            trace!("assemble {} on {} <- {slot}", block.variable, block.entity);
            values.rows_mut(range.start, range.len()).copy_from(stored);
        }
        Ok(values)
    }

    /// Stored values of every block, concatenated in block order.
    pub fn get_variable_values<S: StateStore + ?Sized>(
        &self,
        store: &S,
        from_iterate: bool,
    ) -> Result<DVector<f64>> {
        self.assemble_variable(store, None, None, from_iterate)
    }

    fn stored<'s, S: StateStore + ?Sized>(
        &self,
        store: &'s S,
        slot: StateSlot,
        block: &Block,
    ) -> Result<&'s DVector<f64>> {
        store
            .get(slot, block.entity, &block.variable)
            .ok_or_else(|| Error::MissingValue {
                entity: block.entity,
                variable: block.variable.clone(),
                slot,
            })
    }
}

impl fmt::Display for DofManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let with_blocks = self.default_entities();
        let num_interfaces = with_blocks
            .iter()
            .filter(|&&e| matches!(self.entities.get(&e), Some(info) if info.kind == EntityKind::Interface))
            .count();
        let num_subdomains = with_blocks.len() - num_interfaces;
        writeln!(
            f,
            "Degree of freedom manager for {num_subdomains} subdomains and {num_interfaces} interfaces."
        )?;
        writeln!(f, "Total number of degrees of freedom: {}", self.num_dofs())?;
        writeln!(
            f,
            "Total number of subdomain and interface variables: {}",
            self.num_blocks()
        )?;
        write!(f, "Variable names: {:?}", self.default_variables())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{DofSpec, EntityCounts};
    use crate::state::MemoryStore;
    use nalgebra::dvector;

    fn cells(n: usize) -> EntityCounts {
        EntityCounts {
            cells: n,
            ..Default::default()
        }
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    /// Two subdomains with 3 and 2 cells, one pressure dof per cell.
    fn two_subdomains() -> (MixedDimLayout, EntityId, EntityId) {
        let mut layout = MixedDimLayout::new();
        let e1 = layout.add_subdomain("E1", &cells(3));
        let e2 = layout.add_subdomain("E2", &cells(2));
        layout.declare(e1, "p", DofSpec::cells(1));
        layout.declare(e2, "p", DofSpec::cells(1));
        (layout, e1, e2)
    }

    /// Subdomains and an interface, declared interleaved.
    fn fractured() -> (MixedDimLayout, EntityId, EntityId, EntityId) {
        let mut layout = MixedDimLayout::new();
        let matrix = layout.add_subdomain(
            "matrix",
            &EntityCounts {
                cells: 4,
                faces: 12,
                nodes: 9,
            },
        );
        let mortar = layout.add_interface("mortar", &cells(2));
        let fracture = layout.add_subdomain(
            "fracture",
            &EntityCounts {
                cells: 2,
                faces: 3,
                nodes: 0,
            },
        );
        layout.declare(matrix, "p", DofSpec::cells(1));
        layout.declare(matrix, "u", DofSpec::nodes(2));
        layout.declare(mortar, "lambda", DofSpec { cells: 1, faces: 5, nodes: 5 });
        layout.declare(fracture, "p", DofSpec::cells(1));
        layout.declare(fracture, "flux", DofSpec::faces(1));
        (layout, matrix, mortar, fracture)
    }

    #[test]
    fn blocks_follow_registration_order() {
        let (layout, e1, e2) = two_subdomains();
        let dm = DofManager::new(&layout);
        assert_eq!(dm.num_dofs(), 5);
        assert_eq!(dm.block_id(e1, "p").expect("block"), 0);
        assert_eq!(dm.block_id(e2, "p").expect("block"), 1);
        assert_eq!(dm.grid_and_variable_to_dofs(e1, "p").expect("dofs"), 0..3);
        assert_eq!(dm.grid_and_variable_to_dofs(e2, "p").expect("dofs"), 3..5);
    }

    #[test]
    fn subdomains_come_before_interfaces() {
        let (layout, matrix, mortar, fracture) = fractured();
        let dm = DofManager::new(&layout);
        // matrix p: 4, matrix u: 18, fracture p: 2, fracture flux: 3, mortar lambda: 2
        assert_eq!(dm.block_widths(), vec![4, 18, 2, 3, 2]);
        assert_eq!(dm.block_range(matrix, "u").expect("range"), BlockRange { start: 4, end: 22 });
        assert_eq!(dm.block_range(fracture, "flux").expect("range").indices(), 24..27);
        assert_eq!(dm.block_range(mortar, "lambda").expect("range").indices(), 27..29);
        assert_eq!(dm.num_dofs(), dm.block_widths().iter().sum::<usize>());
    }

    #[test]
    fn empty_registry_has_no_dofs() {
        let mut layout = MixedDimLayout::new();
        layout.add_subdomain("bare", &cells(10));
        let dm = DofManager::new(&layout);
        assert_eq!(dm.num_dofs(), 0);
        assert_eq!(dm.num_blocks(), 0);
        assert_err_contains(dm.dof_to_grid_and_variable(0), "larger than system size 0");

        let store = MemoryStore::new();
        let values = dm.get_variable_values(&store, false).expect("empty gather");
        assert_eq!(values.len(), 0);
    }

    #[test]
    fn unknown_block_is_a_lookup_error() {
        let (layout, e1, _) = two_subdomains();
        let dm = DofManager::new(&layout);
        assert!(matches!(
            dm.grid_and_variable_to_dofs(e1, "T"),
            Err(Error::UnknownBlock { .. })
        ));
        assert_err_contains(
            dm.dofs_of(&[Variable::new(EntityId(7), "p")]),
            "No block registered for variable 'p' on entity 7",
        );
    }

    #[test]
    fn dofs_of_preserves_argument_order() {
        let (layout, e1, e2) = two_subdomains();
        let dm = DofManager::new(&layout);
        let dofs = dm
            .dofs_of(&[Variable::new(e2, "p"), Variable::new(e1, "p")])
            .expect("dofs");
        assert_eq!(dofs, vec![3, 4, 0, 1, 2]);
        assert!(dm.dofs_of(&[]).expect("no variables").is_empty());
    }

    #[test]
    fn inverse_lookup() {
        let (layout, _, e2) = two_subdomains();
        let dm = DofManager::new(&layout);
        assert_eq!(dm.dof_to_grid_and_variable(4).expect("lookup"), (e2, "p"));
        assert!(matches!(dm.dof_to_grid_and_variable(-1), Err(Error::NegativeIndex(-1))));
        assert!(matches!(
            dm.dof_to_grid_and_variable(5),
            Err(Error::IndexOutOfRange { index: 5, size: 5 })
        ));
    }

    #[test]
    fn inverse_lookup_is_consistent_with_ranges() {
        let (mut layout, matrix, _, _) = fractured();
        // zero-width block in the middle
        layout.declare(matrix, "empty", DofSpec::default());
        let dm = DofManager::new(&layout);
        for i in 0..dm.num_dofs() {
            let (entity, name) = dm.dof_to_grid_and_variable(i as i64).expect("lookup");
            assert!(dm.block_range(entity, name).expect("range").contains(i));
        }
    }

    #[test]
    fn distribute_then_assemble_round_trips() {
        let (layout, e1, e2) = two_subdomains();
        let dm = DofManager::new(&layout);
        let mut store = MemoryStore::new();
        let values = dvector![1.0, 2.0, 3.0, 4.0, 5.0];

        dm.distribute_variable(&mut store, &values, None, None, false, false)
            .expect("distribute");
        assert_eq!(store.get(StateSlot::Current, e1, "p"), Some(&dvector![1.0, 2.0, 3.0]));
        assert_eq!(store.get(StateSlot::Current, e2, "p"), Some(&dvector![4.0, 5.0]));

        let assembled = dm.assemble_variable(&store, None, None, false).expect("assemble");
        assert_eq!(assembled, values);
    }

    #[test]
    fn round_trip_on_mixed_layout() {
        let (layout, _, _, _) = fractured();
        let dm = DofManager::new(&layout);
        let mut store = MemoryStore::new();
        let values = DVector::from_fn(dm.num_dofs(), |i, _| i as f64 * 0.5 - 3.0);
        dm.distribute_variable(&mut store, &values, None, None, false, true)
            .expect("distribute");
        assert_eq!(dm.get_variable_values(&store, true).expect("gather"), values);
        assert_err_contains(dm.get_variable_values(&store, false), "(state)");
    }

    #[test]
    fn selection_limits_scatter_and_gather() {
        let (layout, matrix, mortar, fracture) = fractured();
        let dm = DofManager::new(&layout);
        let mut store = MemoryStore::new();
        let values = DVector::from_element(dm.num_dofs(), 1.0);

        dm.distribute_variable(
            &mut store,
            &values,
            Some(&[fracture, mortar][..]),
            Some(&["p", "lambda"][..]),
            false,
            false,
        )
        .expect("distribute");
        assert!(store.get(StateSlot::Current, matrix, "p").is_none());
        assert!(store.get(StateSlot::Current, fracture, "flux").is_none());
        assert_eq!(store.len(), 2);

        let gathered = dm
            .assemble_variable(&store, Some(&[fracture][..]), None, false)
            .expect_err("flux was never stored");
        assert!(matches!(gathered, Error::MissingValue { .. }));

        let gathered = dm
            .assemble_variable(&store, None, Some(&["lambda"][..]), false)
            .expect("assemble");
        let lambda = dm.block_range(mortar, "lambda").expect("range");
        for i in 0..dm.num_dofs() {
            let expected = if lambda.contains(i) { 1.0 } else { 0.0 };
            assert_eq!(gathered[i], expected);
        }
    }

    #[test]
    fn additive_distribution_accumulates() {
        let (layout, e1, _) = two_subdomains();
        let dm = DofManager::new(&layout);
        let mut store = MemoryStore::new();
        let values = dvector![1.0, 2.0, 3.0, 4.0, 5.0];

        assert!(matches!(
            dm.distribute_variable(&mut store, &values, None, None, true, true),
            Err(Error::MissingValue { slot: StateSlot::Iterate, .. })
        ));

        dm.distribute_variable(&mut store, &values, None, None, false, true)
            .expect("distribute");
        dm.distribute_variable(&mut store, &values, None, None, true, true)
            .expect("additive");
        assert_eq!(store.get(StateSlot::Iterate, e1, "p"), Some(&dvector![2.0, 4.0, 6.0]));
        assert!(store.get(StateSlot::Current, e1, "p").is_none());
    }

    #[test]
    fn distribute_copies_input() {
        let (layout, e1, _) = two_subdomains();
        let dm = DofManager::new(&layout);
        let mut store = MemoryStore::new();
        let mut values = dvector![1.0, 2.0, 3.0, 4.0, 5.0];
        dm.distribute_variable(&mut store, &values, None, None, false, false)
            .expect("distribute");
        values[0] = 100.0;
        assert_eq!(store.get(StateSlot::Current, e1, "p").map(|v| v[0]), Some(1.0));
    }

    #[test]
    fn distribute_rejects_wrong_length() {
        let (layout, _, _) = two_subdomains();
        let dm = DofManager::new(&layout);
        let mut store = MemoryStore::new();
        assert_err_contains(
            dm.distribute_variable(&mut store, &dvector![1.0], None, None, false, false),
            "distribute_variable",
        );
    }

    #[test]
    fn dofs_of_variables_and_projection() {
        let (layout, _, _, _) = fractured();
        let dm = DofManager::new(&layout);
        let dofs = dm.dofs_of_variables(&["p", "lambda"]);
        assert_eq!(dofs, vec![0, 1, 2, 3, 22, 23, 27, 28]);

        let proj = dm.projection(&["p", "lambda"]);
        assert_eq!((proj.nrows(), proj.ncols()), (8, dm.num_dofs()));
        let x = DVector::from_fn(dm.num_dofs(), |i, _| i as f64);
        let selected = crate::autodiff::sparse::mat_vec(&proj, &x).expect("projection");
        let expected: Vec<f64> = dofs.iter().map(|&i| i as f64).collect();
        assert_eq!(selected.as_slice(), expected.as_slice());
    }

    #[test]
    fn block_ranges_grouping() {
        let (layout, matrix, mortar, fracture) = fractured();
        let dm = DofManager::new(&layout);

        match dm.block_ranges(None, Some(&["p"][..]), SortBy::Variables) {
            BlockRanges::ByVariable(groups) => {
                assert_eq!(groups.len(), 1);
                let (name, ranges) = &groups[0];
                assert_eq!(name, "p");
                assert_eq!(
                    ranges,
                    &vec![
                        (matrix, BlockRange { start: 0, end: 4 }),
                        (fracture, BlockRange { start: 22, end: 24 }),
                    ]
                );
            }
            other => panic!("unexpected grouping {other:?}"),
        }

        match dm.block_ranges(Some(&[mortar, matrix][..]), None, SortBy::Entities) {
            BlockRanges::ByEntity(groups) => {
                assert_eq!(groups[0].0, mortar);
                assert_eq!(groups[0].1.len(), 1);
                assert_eq!(groups[1].1.len(), 2);
            }
            other => panic!("unexpected grouping {other:?}"),
        }

        match dm.block_ranges(None, None, SortBy::None) {
            BlockRanges::Flat(pairs) => assert_eq!(pairs.len(), dm.num_blocks()),
            other => panic!("unexpected grouping {other:?}"),
        }
    }

    #[test]
    fn block_range_report_lists_ranges() {
        let (layout, matrix, _, _) = fractured();
        let dm = DofManager::new(&layout);

        let by_entity = dm.block_range_report(Some(&[matrix][..]), None, SortBy::Entities);
        assert_eq!(
            by_entity,
            "Grid with name matrix\n\tVariable: p. Range: (0, 4)\n\tVariable: u. Range: (4, 22)\n\n"
        );

        let by_var = dm.block_range_report(None, Some(&["lambda"][..]), SortBy::Variables);
        assert!(by_var.starts_with("Variable lambda\n\tInterface with name mortar Range: (27, 29)"));

        let flat = dm.block_range_report(None, Some(&["flux"][..]), SortBy::None);
        assert_eq!(flat, "Grid with name fracture, variable flux. Range: (24, 27)\n");
    }

    #[test]
    fn display_summarizes_registry() {
        let (layout, _, _, _) = fractured();
        let dm = DofManager::new(&layout);
        let text = dm.to_string();
        assert!(text.contains("2 subdomains and 1 interfaces"));
        assert!(text.contains("degrees of freedom: 29"));
        assert!(text.contains("variables: 5"));
    }

    #[test]
    fn newton_iteration_through_registry() -> anyhow::Result<()> {
        use crate::autodiff::{functions, init_ad_arrays, sparse, AdArray, Value};
        use anyhow::Context;

        let (layout, e1, e2) = two_subdomains();
        let dm = DofManager::new(&layout);
        let mut store = MemoryStore::new();
        let guess = DVector::from_element(dm.num_dofs(), 1.0);
        dm.distribute_variable(&mut store, &guess, None, None, false, true)?;

        // p^2 = 2 on E1, exp(p) = 3 on E2
        for _ in 0..30 {
            let x = dm.get_variable_values(&store, true)?;
            let blocks = [dm.block_range(e1, "p")?, dm.block_range(e2, "p")?];
            let locals: Vec<DVector<f64>> = blocks
                .iter()
                .map(|r| x.rows(r.start, r.len()).into_owned())
                .collect();
            let seeds = init_ad_arrays(&locals);

            let eq1 = seeds[0].pow(2)?.try_sub(2.0)?;
            let eq2 = functions::exp(&Value::from(seeds[1].clone()))
                .into_ad()?
                .try_sub(3.0)?;
            let (r1, j1) = eq1.into_parts();
            let (r2, j2) = eq2.into_parts();
            let residual = DVector::from_iterator(r1.len() + r2.len(), r1.iter().chain(r2.iter()).copied());
            let system = AdArray::from_components(residual, &[j1, j2])?;
            if system.val().norm() < 1e-12 {
                break;
            }
            let update = sparse::to_dense(system.jac())
                .lu()
                .solve(&-system.val())
                .context("Jacobian should be invertible")?;
            dm.distribute_variable(&mut store, &update, None, None, true, true)?;
        }

        let x = dm.get_variable_values(&store, true)?;
        for i in dm.grid_and_variable_to_dofs(e1, "p")? {
            assert!((x[i] - 2.0_f64.sqrt()).abs() < 1e-10);
        }
        for i in dm.grid_and_variable_to_dofs(e2, "p")? {
            assert!((x[i] - 3.0_f64.ln()).abs() < 1e-10);
        }
        Ok(())
    }
}
