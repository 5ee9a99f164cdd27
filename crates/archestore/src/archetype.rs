//! Archetype definitions and storage.
//!
//! An archetype is a unique combination of component types. Entities sharing
//! the same set of components are grouped into the same archetype, one row
//! per entity, with one [`Column`] per component type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::component::{ComponentMetaHandle, ComponentTypeId};
use crate::entity::EntityId;

/// Index of an archetype within its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ArchetypeId(pub u32);

impl ArchetypeId {
    /// The archetype with no components. Every world has one.
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A sorted, duplicate-free set of component types.
///
/// Two sets compare and hash equal regardless of the order in which their
/// types were inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ComponentTypeSet(Vec<ComponentTypeId>);

impl ComponentTypeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The set with `type_id` added.
    #[must_use]
    pub fn with(&self, type_id: ComponentTypeId) -> Self {
        let mut types = self.0.clone();
        if let Err(pos) = types.binary_search(&type_id) {
            types.insert(pos, type_id);
        }
        Self(types)
    }

    /// The set with `type_id` removed.
    #[must_use]
    pub fn without(&self, type_id: ComponentTypeId) -> Self {
        let mut types = self.0.clone();
        if let Ok(pos) = types.binary_search(&type_id) {
            types.remove(pos);
        }
        Self(types)
    }

    #[must_use]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.position(type_id).is_some()
    }

    /// Position of `type_id` in sorted order, which is also its column index.
    #[must_use]
    pub fn position(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.0.binary_search(&type_id).ok()
    }

    /// Returns `true` if every type in `types` is in this set.
    #[must_use]
    pub fn contains_all<'a>(&self, types: impl IntoIterator<Item = &'a ComponentTypeId>) -> bool {
        types.into_iter().all(|&ty| self.contains(ty))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = ComponentTypeId> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ComponentTypeId] {
        &self.0
    }
}

impl FromIterator<ComponentTypeId> for ComponentTypeSet {
    fn from_iter<I: IntoIterator<Item = ComponentTypeId>>(iter: I) -> Self {
        let mut types: Vec<_> = iter.into_iter().collect();
        types.sort_unstable();
        types.dedup();
        Self(types)
    }
}

/// Cached transitions for one component type.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Edge {
    pub(crate) add: Option<ArchetypeId>,
    pub(crate) remove: Option<ArchetypeId>,
}

/// A table of entities sharing the same set of component types.
///
/// Data is stored in struct-of-arrays layout: one [`Column`] per component
/// type, in the order of [`Archetype::types`], with entity ids stored in a
/// parallel vector. All columns and the entity vector always have the same
/// length.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    types: ComponentTypeSet,
    entities: Vec<EntityId>,
    columns: Vec<Column>,
    edges: HashMap<ComponentTypeId, Edge>,
    /// Bumped whenever rows are pushed or removed.
    version: u64,
}

impl Archetype {
    /// Create an empty archetype. `metas` must be in the order of `types`.
    pub(crate) fn new(
        id: ArchetypeId,
        types: ComponentTypeSet,
        metas: Vec<ComponentMetaHandle>,
        column_capacity: usize,
    ) -> Self {
        debug_assert_eq!(types.len(), metas.len());
        let columns = types
            .iter()
            .zip(metas)
            .map(|(type_id, meta)| Column::with_capacity(type_id, meta, column_capacity))
            .collect();

        Self {
            id,
            types,
            entities: Vec::with_capacity(column_capacity),
            columns,
            edges: HashMap::new(),
            version: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The component types stored here, sorted.
    #[must_use]
    pub fn types(&self) -> &ComponentTypeSet {
        &self.types
    }

    /// Entity ids, indexed by row.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of entities in this archetype.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if this archetype has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Structural version; changes whenever rows move.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns `true` if this archetype contains the given component type.
    #[must_use]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.types.contains(type_id)
    }

    /// Returns the column index for the given component type, if present.
    #[must_use]
    pub fn column_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.types.position(type_id)
    }

    #[must_use]
    pub fn column(&self, type_id: ComponentTypeId) -> Option<&Column> {
        self.column_index(type_id).map(|i| &self.columns[i])
    }

    pub(crate) fn column_mut(&mut self, type_id: ComponentTypeId) -> Option<&mut Column> {
        self.column_index(type_id).map(move |i| &mut self.columns[i])
    }

    /// Entity ids and columns, borrowed separately.
    pub(crate) fn split_for_query(&mut self) -> (&[EntityId], &mut [Column]) {
        (&self.entities, &mut self.columns)
    }

    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    /// Appends a row and returns its index.
    ///
    /// Every column is grown before any value is written.
    ///
    /// # Safety
    ///
    /// `values` holds one pointer per column, in column order, each valid as
    /// a source for [`Column::push_raw`]. Ownership of every value moves into
    /// the archetype.
    pub(crate) unsafe fn push_row(&mut self, entity: EntityId, values: &[*const u8]) -> usize {
        assert_eq!(values.len(), self.columns.len(), "one value per column is required");
        self.reserve(1);

        let row = self.entities.len();
        for (column, &src) in self.columns.iter_mut().zip(values) {
            // SAFETY: forwarded from the caller.
            unsafe { column.push_raw(src) };
        }
        self.entities.push(entity);
        self.bump_version();
        row
    }

    /// Destroys the row's components and fills the hole with the last row.
    ///
    /// Returns the entity that moved into `row`, if any.
    pub(crate) fn swap_remove_row(&mut self, row: usize) -> Option<EntityId> {
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        self.entities.swap_remove(row);
        self.bump_version();
        self.entities.get(row).copied()
    }

    /// Moves the entity at `row` into `dst`, which must differ from `self`
    /// by at most one component type.
    ///
    /// Shared components move bitwise. Components `dst` lacks are destroyed.
    /// A component only `dst` has is taken from `added`.
    ///
    /// Returns the entity's row in `dst` and the entity displaced into `row`,
    /// if any.
    ///
    /// # Safety
    ///
    /// If `dst` has a component `self` lacks, `added` must be a valid source
    /// for [`Column::push_raw`] on that column.
    pub(crate) unsafe fn move_row(
        &mut self,
        row: usize,
        dst: &mut Archetype,
        added: Option<*const u8>,
    ) -> (usize, Option<EntityId>) {
        dst.reserve(1);

        for column in &mut self.columns {
            match dst.column_mut(column.type_id()) {
                Some(target) => column.swap_remove_into(row, target),
                None => column.swap_remove(row),
            }
        }

        let types = &self.types;
        for column in dst.columns.iter_mut().filter(|c| !types.contains(c.type_id())) {
            let src = added.unwrap_or_else(|| panic!("no value for {}", column.type_id()));
            // SAFETY: forwarded from the caller.
            unsafe { column.push_raw(src) };
        }

        let entity = self.entities.swap_remove(row);
        let dst_row = dst.entities.len();
        dst.entities.push(entity);

        self.bump_version();
        dst.bump_version();
        (dst_row, self.entities.get(row).copied())
    }

    pub(crate) fn edge(&self, type_id: ComponentTypeId) -> Edge {
        self.edges.get(&type_id).copied().unwrap_or_default()
    }

    pub(crate) fn set_add_edge(&mut self, type_id: ComponentTypeId, target: ArchetypeId) {
        self.edges.entry(type_id).or_default().add = Some(target);
    }

    pub(crate) fn set_remove_edge(&mut self, type_id: ComponentTypeId, target: ArchetypeId) {
        self.edges.entry(type_id).or_default().remove = Some(target);
    }
}
