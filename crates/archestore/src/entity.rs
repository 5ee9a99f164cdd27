//! Entity identifiers and the generational allocator.
//!
//! An [`EntityId`] is a `(generation, index)` pair. The index names a slot in
//! the [`EntityAllocator`]; the generation tells successive occupants of that
//! slot apart, so a stale id never resolves to the entity that replaced it.
//!
//! Generations wrap after `u32::MAX` frees of a single slot, at which point an
//! old id can alias a new one. This is an accepted limitation.

use serde::{Deserialize, Serialize};

/// A generational entity identifier.
///
/// Entities are pure identifiers: they carry no data of their own. Two ids
/// are equal only if both the index and the generation match.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    generation: u32,
    index: u32,
}

impl EntityId {
    /// Create an id from its raw parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { generation, index }
    }

    /// The allocator slot this id refers to.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// The generation of the slot at the time this id was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    pub(crate) const fn slot(self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

/// Issues and recycles [`EntityId`]s.
///
/// Freed indices go onto a free list and are reused before new slots are
/// appended. A slot's generation starts at 0 and grows by one on every free.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    occupied: Vec<bool>,
    free: Vec<u32>,
    alive: usize,
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator with room for `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generations: Vec::with_capacity(capacity),
            occupied: Vec::with_capacity(capacity),
            free: Vec::new(),
            alive: 0,
        }
    }

    /// Allocates an id, reusing a freed slot when one is available.
    pub fn allocate(&mut self) -> EntityId {
        self.alive += 1;

        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.occupied[slot] = true;
            return EntityId::new(index, self.generations[slot]);
        }

        let index = u32::try_from(self.generations.len())
            .unwrap_or_else(|_| panic!("entity index space exhausted"));
        self.generations.push(0);
        self.occupied.push(true);
        EntityId::new(index, 0)
    }

    /// Frees `id`, bumping its slot's generation.
    ///
    /// Returns `false` and does nothing if `id` was not alive.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        let slot = id.slot();
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.occupied[slot] = false;
        self.free.push(id.index);
        self.alive -= 1;
        true
    }

    /// Returns `true` if `id` is the current occupant of its slot.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        let slot = id.slot();
        self.occupied.get(slot).copied().unwrap_or(false) && self.generations[slot] == id.generation
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Returns `true` if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Number of slots ever created, live or free.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_parts() {
        let e = EntityId::new(42, 7);
        assert_eq!(e.index(), 42);
        assert_eq!(e.generation(), 7);
        assert_eq!(e.to_string(), "Entity(42v7)");
    }

    #[test]
    fn test_allocator_produces_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        let e3 = alloc.allocate();
        assert_eq!(e1, EntityId::new(0, 0));
        assert_eq!(e2, EntityId::new(1, 0));
        assert_eq!(e3, EntityId::new(2, 0));
        assert_eq!(alloc.len(), 3);
    }

    #[test]
    fn test_free_bumps_generation_and_recycles_slot() {
        let mut alloc = EntityAllocator::new();
        let first = alloc.allocate();
        assert!(alloc.free(first));
        assert!(!alloc.is_alive(first));

        let second = alloc.allocate();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(alloc.is_alive(second));
        assert!(!alloc.is_alive(first));
        assert_eq!(alloc.slot_count(), 1);
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.free(e));
        assert!(!alloc.free(e));
        assert!(alloc.is_empty());
    }

    #[test]
    fn test_free_slot_is_not_alive_for_next_generation() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        alloc.free(e);

        // The id the slot would hand out next must not count as alive yet.
        let forged = EntityId::new(e.index(), e.generation() + 1);
        assert!(!alloc.is_alive(forged));
    }

    #[test]
    fn test_unknown_index_is_not_alive() {
        let alloc = EntityAllocator::new();
        assert!(!alloc.is_alive(EntityId::new(10, 0)));
    }

    #[test]
    fn test_generation_wraps() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        alloc.generations[0] = u32::MAX;
        let e = EntityId::new(e.index(), u32::MAX);
        assert!(alloc.free(e));

        let reused = alloc.allocate();
        assert_eq!(reused.generation(), 0);
    }

    #[test]
    fn test_entity_serialization_roundtrip() {
        let entity = EntityId::new(999, 3);
        let bytes = rmp_serde::to_vec(&entity).unwrap();
        let restored: EntityId = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(entity, restored);
    }
}
