//! Multi-component entity construction.
//!
//! An [`EntityBuilder`] collects component values first and places the entity
//! in its final archetype with a single row push, instead of walking the
//! archetype graph once per component.

use bytemuck::Pod;

use crate::archetype::ComponentTypeSet;
use crate::column::Column;
use crate::component::{ComponentMetaHandle, ComponentTypeId};
use crate::entity::EntityId;
use crate::error::{Result, StoreError};
use crate::world::World;

/// A pending entity. Nothing is visible in the world until [`build`].
///
/// Dropping an unbuilt builder destroys its pending values.
///
/// [`build`]: EntityBuilder::build
#[derive(Debug)]
#[must_use = "an entity builder does nothing until `build` is called"]
pub struct EntityBuilder<'w> {
    world: &'w mut World,
    /// One single-row column per pending component.
    pending: Vec<Column>,
    component_meta: Option<ComponentMetaHandle>,
}

impl<'w> EntityBuilder<'w> {
    pub(crate) fn new(
        world: &'w mut World,
        capacity: usize,
        component_meta: Option<ComponentMetaHandle>,
    ) -> Self {
        Self {
            world,
            pending: Vec::with_capacity(capacity),
            component_meta,
        }
    }

    /// Adds a component, copying its value from `bytes`.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownComponent`], [`StoreError::DuplicateComponent`]
    /// if the type was already added, or [`StoreError::InvalidLayout`] if `bytes`
    /// is not exactly one value long.
    pub fn with_component(mut self, type_id: ComponentTypeId, bytes: &[u8]) -> Result<Self> {
        let meta = self.world.registry().require(type_id)?.clone();
        if self.pending.iter().any(|column| column.type_id() == type_id) {
            return Err(StoreError::DuplicateComponent(type_id));
        }
        meta.check_data(bytes)?;

        let mut column = Column::with_capacity(type_id, meta, 1);
        column.push_bytes(bytes);
        self.pending.push(column);
        Ok(self)
    }

    /// Adds a zero-sized component.
    pub fn with_unit(self, type_id: ComponentTypeId) -> Result<Self> {
        if !self.world.registry().require(type_id)?.is_zero_sized() {
            return Err(StoreError::MissingData(type_id));
        }
        self.with_component(type_id, &[])
    }

    /// Typed form of [`EntityBuilder::with_component`].
    pub fn with_value<T: Pod>(self, type_id: ComponentTypeId, value: T) -> Result<Self> {
        self.world.registry().require(type_id)?.check_value::<T>()?;
        self.with_component(type_id, bytemuck::bytes_of(&value))
    }

    /// Number of pending components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Spawns the entity with every pending component.
    pub fn build(mut self) -> EntityId {
        self.pending.sort_unstable_by_key(Column::type_id);
        let types: ComponentTypeSet = self.pending.iter().map(Column::type_id).collect();
        let metas = self.pending.iter().map(|column| column.meta().clone()).collect();
        let values: Vec<*const u8> = self.pending.iter().map(Column::as_ptr).collect();

        // SAFETY: each pending column holds exactly one value of its type, in
        // the sorted order `types` uses.
        let id = unsafe { self.world.spawn_row(types, metas, &values) };
        for column in &mut self.pending {
            // SAFETY: the values were moved into the world above.
            unsafe { column.forget_rows() };
        }

        if let Some(meta) = self.component_meta.take() {
            self.world.register_meta(id, meta);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::component::ComponentMeta;

    #[test]
    fn test_build_places_all_components_at_once() {
        let mut world = World::new();
        let a = world.register_component(ComponentMeta::from_size_align(4, 4).unwrap());
        let b = world.register_component(ComponentMeta::from_size_align(8, 8).unwrap());
        let before = world.archetype_count();

        let e = world
            .spawn_builder()
            .with_value(b, 2u64)
            .unwrap()
            .with_value(a, 1u32)
            .unwrap()
            .build();

        // Only the final archetype was created.
        assert_eq!(world.archetype_count(), before + 1);
        assert_eq!(world.get_component::<u32>(e, a).unwrap(), Some(&1));
        assert_eq!(world.get_component::<u64>(e, b).unwrap(), Some(&2));
    }

    #[test]
    fn test_duplicate_component_is_rejected() {
        let mut world = World::new();
        let a = world.register_component(ComponentMeta::from_size_align(4, 4).unwrap());
        let result = world
            .spawn_builder()
            .with_value(a, 1u32)
            .unwrap()
            .with_value(a, 2u32);
        assert!(matches!(result, Err(StoreError::DuplicateComponent(ty)) if ty == a));
    }

    #[test]
    fn test_with_component_validates_input() {
        let mut world = World::new();
        let a = world.register_component(ComponentMeta::from_size_align(4, 4).unwrap());
        let stranger = ComponentTypeId::from(EntityId::new(50, 0));

        assert!(matches!(
            world.spawn_builder().with_component(stranger, &[]),
            Err(StoreError::UnknownComponent(_))
        ));
        assert!(matches!(
            world.spawn_builder().with_component(a, &[0; 3]),
            Err(StoreError::InvalidLayout { size: 3, align: 4 })
        ));
        assert!(matches!(
            world.spawn_builder().with_unit(a),
            Err(StoreError::MissingData(_))
        ));
    }

    #[test]
    fn test_empty_builder_spawns_into_empty_archetype() {
        let mut world = World::new();
        let builder = world.spawn_builder_with_capacity(4);
        assert!(builder.is_empty());
        let e = builder.build();
        assert_eq!(world.location(e).unwrap().archetype, crate::ArchetypeId::EMPTY);
    }

    #[test]
    fn test_unbuilt_builder_destroys_pending_values() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        unsafe fn count(_: *mut u8) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }

        let mut world = World::new();
        let meta = unsafe { ComponentMeta::from_size_align(4, 4).unwrap().with_drop(count) };
        let a = world.register_component(meta);
        let entities = world.entity_count();

        let builder = world.spawn_builder().with_value(a, 9u32).unwrap();
        assert_eq!(builder.len(), 1);
        drop(builder);

        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
        assert_eq!(world.entity_count(), entities);
    }

    #[test]
    fn test_built_values_are_not_destroyed_twice() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        unsafe fn count(_: *mut u8) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }

        let mut world = World::new();
        let meta = unsafe { ComponentMeta::from_size_align(4, 4).unwrap().with_drop(count) };
        let a = world.register_component(meta);
        let e = world.spawn_builder().with_value(a, 9u32).unwrap().build();
        assert_eq!(DROPS.load(Ordering::SeqCst), 0);

        world.despawn(e);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_component_meta_builder_registers_type() {
        let mut world = World::new();
        let tag = world.register_component(ComponentMeta::unit());
        let ty = world
            .spawn_with_component_meta(ComponentMeta::from_size_align(2, 2).unwrap())
            .with_unit(tag)
            .unwrap()
            .build();

        let ty = ComponentTypeId::from(ty);
        assert_eq!(world.component_meta(ty).unwrap().size(), 2);
        assert!(world.has_component(ty.entity(), tag));
    }
}
