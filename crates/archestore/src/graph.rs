//! The archetype graph.
//!
//! Archetypes are nodes; adding or removing one component type is an edge.
//! Targets are created lazily on first use and cached on both endpoints.

use std::collections::HashMap;

use tracing::debug;

use crate::archetype::{Archetype, ArchetypeId, ComponentTypeSet};
use crate::component::{ComponentMetaHandle, ComponentRegistry, ComponentTypeId};
use crate::entity::EntityId;
use crate::error::Result;

/// Owns every archetype of a world and indexes them by type set.
#[derive(Debug)]
pub struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    by_types: HashMap<ComponentTypeSet, ArchetypeId>,
    column_capacity: usize,
}

impl ArchetypeGraph {
    /// Creates a graph holding only the empty archetype.
    pub(crate) fn new(archetype_capacity: usize, column_capacity: usize) -> Self {
        let mut graph = Self {
            archetypes: Vec::with_capacity(archetype_capacity.max(1)),
            by_types: HashMap::with_capacity(archetype_capacity),
            column_capacity,
        };
        let empty = graph.find_or_create(ComponentTypeSet::new(), Vec::new());
        debug_assert_eq!(empty, ArchetypeId::EMPTY);
        graph
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Always `false`: the empty archetype exists from construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Archetype> {
        self.archetypes.iter()
    }

    /// Archetypes indexed by [`ArchetypeId::index`].
    #[must_use]
    pub fn as_slice(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    /// The archetype holding exactly `types`, if it exists.
    #[must_use]
    pub fn find(&self, types: &ComponentTypeSet) -> Option<ArchetypeId> {
        self.by_types.get(types).copied()
    }

    /// The archetype holding exactly `types`, created from `metas` if needed.
    /// `metas` must be in the order of `types`.
    pub(crate) fn find_or_create(
        &mut self,
        types: ComponentTypeSet,
        metas: Vec<ComponentMetaHandle>,
    ) -> ArchetypeId {
        if let Some(id) = self.find(&types) {
            return id;
        }
        let index = u32::try_from(self.archetypes.len())
            .unwrap_or_else(|_| panic!("archetype index space exhausted"));
        let id = ArchetypeId(index);

        debug!(archetype = ?id, types = ?types.as_slice(), "creating archetype");
        self.archetypes.push(Archetype::new(id, types.clone(), metas, self.column_capacity));
        self.by_types.insert(types, id);
        id
    }

    /// The archetype holding exactly `types`, created if needed.
    pub(crate) fn get_or_create(
        &mut self,
        types: ComponentTypeSet,
        registry: &ComponentRegistry,
    ) -> Result<ArchetypeId> {
        if let Some(id) = self.find(&types) {
            return Ok(id);
        }
        let metas = types
            .iter()
            .map(|ty| registry.require(ty).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(self.find_or_create(types, metas))
    }

    /// The archetype reached from `from` by adding `type_id`.
    pub(crate) fn add_target(
        &mut self,
        from: ArchetypeId,
        type_id: ComponentTypeId,
        registry: &ComponentRegistry,
    ) -> Result<ArchetypeId> {
        if let Some(target) = self.archetypes[from.index()].edge(type_id).add {
            return Ok(target);
        }

        let types = self.archetypes[from.index()].types().with(type_id);
        let target = self.get_or_create(types, registry)?;
        self.archetypes[from.index()].set_add_edge(type_id, target);
        self.archetypes[target.index()].set_remove_edge(type_id, from);
        Ok(target)
    }

    /// The archetype reached from `from` by removing `type_id`.
    pub(crate) fn remove_target(
        &mut self,
        from: ArchetypeId,
        type_id: ComponentTypeId,
        registry: &ComponentRegistry,
    ) -> Result<ArchetypeId> {
        if let Some(target) = self.archetypes[from.index()].edge(type_id).remove {
            return Ok(target);
        }

        let types = self.archetypes[from.index()].types().without(type_id);
        let target = self.get_or_create(types, registry)?;
        self.archetypes[from.index()].set_remove_edge(type_id, target);
        self.archetypes[target.index()].set_add_edge(type_id, from);
        Ok(target)
    }

    /// Two distinct archetypes, borrowed mutably at once.
    fn pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> (&mut Archetype, &mut Archetype) {
        let (a, b) = (a.index(), b.index());
        assert_ne!(a, b, "an archetype cannot transition to itself");
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Moves the entity at `row` of `from` into `to`.
    ///
    /// Returns the new row and the entity displaced into the old one.
    ///
    /// # Safety
    ///
    /// Same contract as [`Archetype::move_row`].
    pub(crate) unsafe fn move_entity(
        &mut self,
        from: ArchetypeId,
        row: usize,
        to: ArchetypeId,
        added: Option<*const u8>,
    ) -> (usize, Option<EntityId>) {
        let (src, dst) = self.pair_mut(from, to);
        // SAFETY: forwarded from the caller.
        unsafe { src.move_row(row, dst, added) }
    }

    /// Ids of the archetypes whose types include all of `required`.
    #[must_use]
    pub fn matching_archetypes(&self, required: &[ComponentTypeId]) -> Vec<ArchetypeId> {
        self.archetypes
            .iter()
            .filter(|arch| arch.types().contains_all(required))
            .map(Archetype::id)
            .collect()
    }
}
