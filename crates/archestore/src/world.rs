//! The world: entity storage over archetype columns.
//!
//! All structural mutation goes through [`World`], which keeps the
//! entity-location table in step with the archetypes. Component data is
//! exchanged as raw bytes; `bytemuck::Pod` types get typed helpers on top.

use std::ptr::NonNull;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::archetype::{Archetype, ArchetypeId, ComponentTypeSet};
use crate::builder::EntityBuilder;
use crate::component::{ComponentMetaHandle, ComponentRegistry, ComponentTypeId};
use crate::config::WorldConfig;
use crate::entity::{EntityAllocator, EntityId};
use crate::error::{Result, StoreError};
use crate::graph::ArchetypeGraph;
use crate::query::{FetchSpec, Query};

/// Where an entity's row lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityLocation {
    pub archetype: ArchetypeId,
    pub row: usize,
}

/// A raw pointer to one component value, as returned by
/// [`World::get_component_mut`].
///
/// The pointer stays valid until rows of its archetype are pushed or removed;
/// [`World::is_ptr_valid`] reports whether that has happened. Callers must
/// not hold a reference into the value across any other access to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentPtr {
    ptr: NonNull<u8>,
    size: usize,
    archetype: ArchetypeId,
    version: u64,
}

impl ComponentPtr {
    #[must_use]
    pub fn as_ptr(self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the pointed-to value in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        self.size
    }

    #[must_use]
    pub fn archetype(self) -> ArchetypeId {
        self.archetype
    }
}

/// The ECS world: entities, their archetypes, and the component registry.
///
/// Dropping the world destroys every stored component.
#[derive(Debug)]
pub struct World {
    entities: EntityAllocator,
    /// Indexed by entity slot; meaningful only for live entities.
    locations: Vec<EntityLocation>,
    registry: ComponentRegistry,
    archetypes: ArchetypeGraph,
}

impl World {
    /// Creates an empty world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        debug!(?config, "creating world");
        Self {
            entities: EntityAllocator::with_capacity(config.entity_capacity),
            locations: Vec::with_capacity(config.entity_capacity),
            registry: ComponentRegistry::new(),
            archetypes: ArchetypeGraph::new(config.archetype_capacity, config.column_capacity),
        }
    }

    // -- Entity lifecycle --

    /// Spawns an entity with no components.
    pub fn spawn(&mut self) -> EntityId {
        // SAFETY: the empty archetype has no columns, so no values are read.
        unsafe { self.spawn_row(ComponentTypeSet::new(), Vec::new(), &[]) }
    }

    /// Begins assembling an entity whose components are committed at once.
    pub fn spawn_builder(&mut self) -> EntityBuilder<'_> {
        EntityBuilder::new(self, 0, None)
    }

    pub fn spawn_builder_with_capacity(&mut self, capacity: usize) -> EntityBuilder<'_> {
        EntityBuilder::new(self, capacity, None)
    }

    /// Begins assembling an entity that becomes a component type described
    /// by `meta` once built.
    pub fn spawn_with_component_meta(
        &mut self,
        meta: impl Into<ComponentMetaHandle>,
    ) -> EntityBuilder<'_> {
        EntityBuilder::new(self, 0, Some(meta.into()))
    }

    /// Registers a new component type and returns its id.
    pub fn register_component(&mut self, meta: impl Into<ComponentMetaHandle>) -> ComponentTypeId {
        ComponentTypeId::from(self.spawn_with_component_meta(meta).build())
    }

    /// Places a new entity into the archetype for `types`.
    ///
    /// # Safety
    ///
    /// `metas` and `values` follow the order of `types`, with every value a
    /// valid source for its column. Ownership of the values moves into the
    /// world.
    pub(crate) unsafe fn spawn_row(
        &mut self,
        types: ComponentTypeSet,
        metas: Vec<ComponentMetaHandle>,
        values: &[*const u8],
    ) -> EntityId {
        let archetype = self.archetypes.find_or_create(types, metas);
        let id = self.entities.allocate();
        let arch = &mut self.archetypes_mut()[archetype.index()];
        // SAFETY: forwarded from the caller.
        let row = unsafe { arch.push_row(id, values) };
        self.place(id, EntityLocation { archetype, row });
        trace!(entity = %id, archetype = ?archetype, "spawned entity");
        id
    }

    /// Records `meta` as the component type backed by `id`.
    pub(crate) fn register_meta(&mut self, id: EntityId, meta: ComponentMetaHandle) {
        debug!(
            component = %ComponentTypeId::from(id),
            name = meta.name(),
            size = meta.size(),
            align = meta.align(),
            "registered component type"
        );
        self.registry.insert(ComponentTypeId::from(id), meta);
    }

    /// Despawns `id`, destroying all of its components.
    ///
    /// If `id` is a component type, that component is first removed from
    /// every entity carrying it and the type is unregistered. Archetypes that
    /// included the type are left in the graph, empty, and nothing moves into
    /// them again, so a world that keeps registering and despawning component
    /// types grows its archetype graph without bound.
    ///
    /// Returns `false` if `id` was not alive.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        let as_component = ComponentTypeId::from(id);
        if self.registry.contains(as_component) {
            self.unregister_component(as_component);
        }

        let location = self.locations[id.slot()];
        let displaced = self.archetypes_mut()[location.archetype.index()].swap_remove_row(location.row);
        self.relocate(displaced, location.row);
        self.entities.free(id);
        trace!(entity = %id, "despawned entity");
        true
    }

    fn unregister_component(&mut self, type_id: ComponentTypeId) {
        for archetype in self.archetypes.matching_archetypes(&[type_id]) {
            while let Some(&holder) = self
                .archetypes
                .get(archetype)
                .and_then(|arch| arch.entities().last())
            {
                if let Err(err) = self.remove_component(holder, type_id) {
                    warn!(entity = %holder, component = %type_id, %err, "failed to strip component");
                    break;
                }
            }
        }
        self.registry.remove(type_id);
        debug!(component = %type_id, "unregistered component type");
    }

    /// Returns `true` if `id` is alive.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
    }

    /// Where `id` is stored, if it is alive.
    #[must_use]
    pub fn location(&self, id: EntityId) -> Option<EntityLocation> {
        self.is_alive(id).then(|| self.locations[id.slot()])
    }

    fn require_location(&self, id: EntityId) -> Result<EntityLocation> {
        self.location(id).ok_or(StoreError::DeadEntity(id))
    }

    fn place(&mut self, id: EntityId, location: EntityLocation) {
        let slot = id.slot();
        if slot >= self.locations.len() {
            self.locations.resize(slot + 1, EntityLocation::default());
        }
        self.locations[slot] = location;
    }

    /// Points a swap-displaced entity at the row it now occupies.
    fn relocate(&mut self, displaced: Option<EntityId>, row: usize) {
        if let Some(moved) = displaced {
            self.locations[moved.slot()].row = row;
        }
    }

    // -- Component operations --

    /// Adds a zero-sized component to `id`. Does nothing if already present.
    ///
    /// # Errors
    ///
    /// [`StoreError::DeadEntity`], [`StoreError::UnknownComponent`], or
    /// [`StoreError::MissingData`] if the component is sized.
    pub fn add_component(&mut self, id: EntityId, type_id: ComponentTypeId) -> Result<()> {
        let location = self.require_location(id)?;
        if !self.registry.require(type_id)?.is_zero_sized() {
            return Err(StoreError::MissingData(type_id));
        }
        if self.archetypes_ref(location).has_component(type_id) {
            return Ok(());
        }
        self.transition_add(id, location, type_id, NonNull::<u8>::dangling().as_ptr())
    }

    /// Adds a component to `id`, copying its value from `bytes`.
    ///
    /// If `id` already has the component, the stored value is destroyed and
    /// replaced in place.
    ///
    /// # Errors
    ///
    /// [`StoreError::DeadEntity`], [`StoreError::UnknownComponent`], or
    /// [`StoreError::InvalidLayout`] if `bytes` is not exactly one value long.
    pub fn add_component_with_data(
        &mut self,
        id: EntityId,
        type_id: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<()> {
        let location = self.require_location(id)?;
        self.registry.require(type_id)?.check_data(bytes)?;

        let arch = &mut self.archetypes_mut()[location.archetype.index()];
        if let Some(column) = arch.column_mut(type_id) {
            // SAFETY: `bytes` is exactly one value of this component.
            unsafe { column.replace_raw(location.row, bytes.as_ptr()) };
            trace!(entity = %id, component = %type_id, "replaced component");
            return Ok(());
        }
        self.transition_add(id, location, type_id, bytes.as_ptr())
    }

    /// Typed form of [`World::add_component_with_data`].
    pub fn add_component_value<T: Pod>(
        &mut self,
        id: EntityId,
        type_id: ComponentTypeId,
        value: T,
    ) -> Result<()> {
        self.require_location(id)?;
        self.registry.require(type_id)?.check_value::<T>()?;
        self.add_component_with_data(id, type_id, bytemuck::bytes_of(&value))
    }

    fn transition_add(
        &mut self,
        id: EntityId,
        location: EntityLocation,
        type_id: ComponentTypeId,
        value: *const u8,
    ) -> Result<()> {
        let target = self.archetypes.add_target(location.archetype, type_id, &self.registry)?;
        // SAFETY: `value` holds one value of `type_id`, the only column the
        // target has beyond the source.
        let (row, displaced) = unsafe {
            self.archetypes.move_entity(location.archetype, location.row, target, Some(value))
        };
        self.relocate(displaced, location.row);
        self.place(id, EntityLocation { archetype: target, row });
        trace!(entity = %id, component = %type_id, archetype = ?target, "added component");
        Ok(())
    }

    /// Removes a component from `id`, destroying its value. Does nothing if
    /// the component is absent.
    ///
    /// # Errors
    ///
    /// [`StoreError::DeadEntity`] or [`StoreError::UnknownComponent`].
    pub fn remove_component(&mut self, id: EntityId, type_id: ComponentTypeId) -> Result<()> {
        let location = self.require_location(id)?;
        self.registry.require(type_id)?;
        if !self.archetypes_ref(location).has_component(type_id) {
            return Ok(());
        }

        let target = self.archetypes.remove_target(location.archetype, type_id, &self.registry)?;
        // SAFETY: the target lacks a column, it never gains one.
        let (row, displaced) =
            unsafe { self.archetypes.move_entity(location.archetype, location.row, target, None) };
        self.relocate(displaced, location.row);
        self.place(id, EntityLocation { archetype: target, row });
        trace!(entity = %id, component = %type_id, archetype = ?target, "removed component");
        Ok(())
    }

    /// Returns `true` if `id` is alive and has the component.
    #[must_use]
    pub fn has_component(&self, id: EntityId, type_id: ComponentTypeId) -> bool {
        self.location(id)
            .is_some_and(|location| self.archetypes_ref(location).has_component(type_id))
    }

    /// A raw pointer to the component value, or `None` if `id` is dead or
    /// lacks the component.
    #[must_use]
    pub fn get_component_mut(
        &mut self,
        id: EntityId,
        type_id: ComponentTypeId,
    ) -> Option<ComponentPtr> {
        let location = self.location(id)?;
        let arch = self.archetypes_ref(location);
        let column = arch.column(type_id)?;
        Some(ComponentPtr {
            ptr: column.get_ptr(location.row)?,
            size: column.meta().size(),
            archetype: location.archetype,
            version: arch.version(),
        })
    }

    /// Returns `false` once rows of the pointer's archetype have moved.
    #[must_use]
    pub fn is_ptr_valid(&self, ptr: &ComponentPtr) -> bool {
        self.archetypes
            .get(ptr.archetype)
            .is_some_and(|arch| arch.version() == ptr.version)
    }

    /// The component's bytes, or `None` if `id` is dead or lacks it.
    #[must_use]
    pub fn get_component_bytes(&self, id: EntityId, type_id: ComponentTypeId) -> Option<&[u8]> {
        let location = self.location(id)?;
        self.archetypes_ref(location).column(type_id)?.get_bytes(location.row)
    }

    #[must_use]
    pub fn get_component_bytes_mut(
        &mut self,
        id: EntityId,
        type_id: ComponentTypeId,
    ) -> Option<&mut [u8]> {
        let location = self.location(id)?;
        self.archetypes_mut()[location.archetype.index()]
            .column_mut(type_id)?
            .get_bytes_mut(location.row)
    }

    /// The component as a `T`, or `Ok(None)` if `id` is dead or lacks it.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownComponent`], or a size/alignment error if `T`
    /// cannot stand in for the component.
    pub fn get_component<T: Pod>(&self, id: EntityId, type_id: ComponentTypeId) -> Result<Option<&T>> {
        self.registry.require(type_id)?.check_value::<T>()?;
        Ok(self.get_component_bytes(id, type_id).map(bytemuck::from_bytes))
    }

    /// The component as a mutable `T`, or `Ok(None)` if `id` is dead or
    /// lacks it.
    pub fn get_component_value_mut<T: Pod>(
        &mut self,
        id: EntityId,
        type_id: ComponentTypeId,
    ) -> Result<Option<&mut T>> {
        self.registry.require(type_id)?.check_value::<T>()?;
        Ok(self.get_component_bytes_mut(id, type_id).map(bytemuck::from_bytes_mut))
    }

    // -- Introspection --

    /// Number of live entities, component types included.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    pub fn archetypes(&self) -> impl ExactSizeIterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// The archetype graph, for lookups by type set.
    #[must_use]
    pub fn graph(&self) -> &ArchetypeGraph {
        &self.archetypes
    }

    #[must_use]
    pub fn component_meta(&self, type_id: ComponentTypeId) -> Option<&ComponentMetaHandle> {
        self.registry.get(type_id)
    }

    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // -- Query --

    /// Validates `spec` and builds a query over this world.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConflictingAccess`] if a component type is fetched twice.
    pub fn query(&self, spec: FetchSpec) -> Result<Query> {
        let query = Query::new(spec)?;
        trace!(spec = ?query.spec(), "created query");
        Ok(query)
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        self.archetypes.as_mut_slice()
    }

    fn archetypes_ref(&self, location: EntityLocation) -> &Archetype {
        &self.archetypes.as_slice()[location.archetype.index()]
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
