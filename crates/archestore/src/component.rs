//! Runtime component metadata.
//!
//! Components are not Rust types at the store's boundary. Each component type
//! is described by a [`ComponentMeta`] (size, alignment, optional destructor)
//! and named by a [`ComponentTypeId`].
//!
//! ## Component types are entities
//!
//! A [`ComponentTypeId`] is the [`EntityId`] of an entity that was spawned
//! with a metadata record attached (see
//! [`World::register_component`](crate::World::register_component)). The
//! [`ComponentRegistry`] maps those ids to their metadata for as long as the
//! entity is alive.

use std::alloc::Layout;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::{Result, StoreError};

/// Identifies a component type. Uses the same encoding as [`EntityId`],
/// because every component type is backed by an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentTypeId(EntityId);

impl ComponentTypeId {
    /// The entity that backs this component type.
    #[must_use]
    pub const fn entity(self) -> EntityId {
        self.0
    }
}

impl From<EntityId> for ComponentTypeId {
    fn from(entity: EntityId) -> Self {
        Self(entity)
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Component({}v{})", self.0.index(), self.0.generation())
    }
}

/// Destructor invoked on a component value in place.
pub type DropFn = unsafe fn(*mut u8);

/// Size, alignment and destructor of a component type.
///
/// Immutable once built; share it through a [`ComponentMetaHandle`].
#[derive(Debug, Clone)]
pub struct ComponentMeta {
    name: Cow<'static, str>,
    layout: Layout,
    drop_fn: Option<DropFn>,
}

impl ComponentMeta {
    /// Describes a component of `size` bytes aligned to `align`.
    ///
    /// `align` must be a power of two and `size` a multiple of it. A size of
    /// zero describes a tag component.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidLayout`] if the pair is not a valid layout.
    pub fn from_size_align(size: usize, align: usize) -> Result<Self> {
        if !align.is_power_of_two() || size % align != 0 {
            return Err(StoreError::InvalidLayout { size, align });
        }
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| StoreError::InvalidLayout { size, align })?;

        Ok(Self {
            name: Cow::Borrowed("anonymous"),
            layout,
            drop_fn: None,
        })
    }

    /// A zero-sized, trivially destructible component.
    #[must_use]
    pub const fn unit() -> Self {
        Self {
            name: Cow::Borrowed("unit"),
            layout: Layout::new::<()>(),
            drop_fn: None,
        }
    }

    /// Attach a human-readable name, used in logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a destructor.
    ///
    /// The store calls `drop_fn` exactly once for every value it discards:
    /// on removal, on overwrite, on despawn and when the world is dropped.
    ///
    /// # Safety
    ///
    /// `drop_fn` must be sound to call on a properly aligned pointer to any
    /// value the caller writes for this component type, including values
    /// written through byte-level or plain-old-data access.
    #[must_use]
    pub unsafe fn with_drop(mut self, drop_fn: DropFn) -> Self {
        self.drop_fn = Some(drop_fn);
        self
    }

    /// Wrap in a shareable handle.
    #[must_use]
    pub fn into_handle(self) -> ComponentMetaHandle {
        Arc::new(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    #[must_use]
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    #[must_use]
    pub fn drop_fn(&self) -> Option<DropFn> {
        self.drop_fn
    }

    /// Returns `true` for tag components that carry no data.
    #[must_use]
    pub fn is_zero_sized(&self) -> bool {
        self.layout.size() == 0
    }

    /// Run the destructor, if any, on the value at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live, aligned value of this component type that
    /// is not used again afterwards.
    pub(crate) unsafe fn drop_in_place(&self, ptr: *mut u8) {
        if let Some(drop_fn) = self.drop_fn {
            // SAFETY: forwarded from the caller and the `with_drop` contract.
            unsafe { drop_fn(ptr) }
        }
    }

    /// Checks that `T` can stand in for this component's bytes.
    pub(crate) fn check_value<T: Pod>(&self) -> Result<()> {
        let size = std::mem::size_of::<T>();
        let align = std::mem::align_of::<T>();
        if size != self.size() || align > self.align() {
            return Err(StoreError::InvalidLayout { size, align });
        }
        Ok(())
    }

    /// Checks that `bytes` holds exactly one value of this component.
    pub(crate) fn check_data(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.size() {
            return Err(StoreError::InvalidLayout {
                size: bytes.len(),
                align: self.align(),
            });
        }
        Ok(())
    }
}

/// Shared, immutable component metadata.
///
/// Archetype columns hold clones of the handle; the registry owns the
/// canonical one. A handle may be registered in several worlds.
pub type ComponentMetaHandle = Arc<ComponentMeta>;

/// Maps live component types to their metadata.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    metas: HashMap<ComponentTypeId, ComponentMetaHandle>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: ComponentTypeId, meta: ComponentMetaHandle) {
        self.metas.insert(id, meta);
    }

    pub(crate) fn remove(&mut self, id: ComponentTypeId) -> Option<ComponentMetaHandle> {
        self.metas.remove(&id)
    }

    /// Metadata for `id`, if registered.
    #[must_use]
    pub fn get(&self, id: ComponentTypeId) -> Option<&ComponentMetaHandle> {
        self.metas.get(&id)
    }

    /// Metadata for `id`, or [`StoreError::UnknownComponent`].
    pub fn require(&self, id: ComponentTypeId) -> Result<&ComponentMetaHandle> {
        self.get(id).ok_or(StoreError::UnknownComponent(id))
    }

    #[must_use]
    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.metas.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentTypeId, &ComponentMetaHandle)> {
        self.metas.iter().map(|(&id, meta)| (id, meta))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_from_size_align_accepts_valid_layouts() {
        let meta = ComponentMeta::from_size_align(16, 8).unwrap();
        assert_eq!(meta.size(), 16);
        assert_eq!(meta.align(), 8);
        assert!(meta.drop_fn().is_none());

        let tag = ComponentMeta::from_size_align(0, 1).unwrap();
        assert!(tag.is_zero_sized());
    }

    #[test]
    fn test_from_size_align_rejects_bad_alignment() {
        assert!(matches!(
            ComponentMeta::from_size_align(6, 3),
            Err(StoreError::InvalidLayout { size: 6, align: 3 })
        ));
        assert!(matches!(
            ComponentMeta::from_size_align(4, 0),
            Err(StoreError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn test_from_size_align_rejects_size_not_multiple_of_align() {
        assert!(matches!(
            ComponentMeta::from_size_align(6, 4),
            Err(StoreError::InvalidLayout { size: 6, align: 4 })
        ));
    }

    #[test]
    fn test_unit_meta() {
        let meta = ComponentMeta::unit();
        assert_eq!(meta.size(), 0);
        assert_eq!(meta.align(), 1);
        assert_eq!(meta.name(), "unit");
    }

    #[test]
    fn test_named_meta() {
        let meta = ComponentMeta::from_size_align(4, 4).unwrap().named("Health");
        assert_eq!(meta.name(), "Health");
    }

    #[test]
    fn test_drop_in_place_runs_destructor() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        unsafe fn count(_: *mut u8) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }

        let meta = unsafe { ComponentMeta::from_size_align(4, 4).unwrap().with_drop(count) };
        let mut value = 7u32;
        unsafe { meta.drop_in_place((&mut value as *mut u32).cast()) };
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_check_value() {
        let meta = ComponentMeta::from_size_align(8, 8).unwrap();
        assert!(meta.check_value::<u64>().is_ok());
        assert!(meta.check_value::<[u32; 2]>().is_ok());
        assert!(matches!(
            meta.check_value::<u32>(),
            Err(StoreError::InvalidLayout { size: 4, align: 4 })
        ));

        let packed = ComponentMeta::from_size_align(8, 4).unwrap();
        assert!(matches!(
            packed.check_value::<u64>(),
            Err(StoreError::InvalidLayout { size: 8, align: 8 })
        ));
    }

    #[test]
    fn test_check_data() {
        let meta = ComponentMeta::from_size_align(16, 8).unwrap();
        assert!(meta.check_data(&[0; 16]).is_ok());
        assert!(matches!(
            meta.check_data(&[0; 8]),
            Err(StoreError::InvalidLayout { size: 8, align: 8 })
        ));
        assert!(ComponentMeta::unit().check_data(&[]).is_ok());
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ComponentRegistry::new();
        let id = ComponentTypeId::from(EntityId::new(3, 0));
        assert!(matches!(
            registry.require(id),
            Err(StoreError::UnknownComponent(missing)) if missing == id
        ));

        registry.insert(id, ComponentMeta::unit().into_handle());
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        // A later generation of the same slot is a different component type.
        let stale = ComponentTypeId::from(EntityId::new(3, 1));
        assert!(!registry.contains(stale));

        assert!(registry.remove(id).is_some());
        assert!(registry.is_empty());
    }
}
