//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use archestore::{ComponentMeta, ComponentTypeId, EntityId, World};

/// `{ x: f64, y: f64 }`, used for both Position and Velocity.
pub type Vec2 = [f64; 2];

pub fn register_vec2(world: &mut World, name: &'static str) -> ComponentTypeId {
    let meta = ComponentMeta::from_size_align(16, 8)
        .expect("valid layout")
        .named(name);
    world.register_component(meta)
}

pub fn vec2(world: &World, entity: EntityId, ty: ComponentTypeId) -> Option<Vec2> {
    world
        .get_component::<Vec2>(entity, ty)
        .expect("layout matches")
        .copied()
}

/// A component whose value is the address of a counter; dropping a value
/// increments that counter.
pub struct DropCounter {
    pub ty: ComponentTypeId,
    counter: &'static AtomicUsize,
}

unsafe fn bump(ptr: *mut u8) {
    let address = unsafe { ptr.cast::<usize>().read() };
    let counter = unsafe { &*(address as *const AtomicUsize) };
    counter.fetch_add(1, Ordering::SeqCst);
}

impl DropCounter {
    pub fn register(world: &mut World) -> Self {
        let meta = ComponentMeta::from_size_align(size_of::<usize>(), align_of::<usize>())
            .expect("valid layout");
        // SAFETY: every value of this type is written by `value`.
        let meta = unsafe { meta.with_drop(bump) }.named("DropCounter");
        Self {
            ty: world.register_component(meta),
            counter: Box::leak(Box::new(AtomicUsize::new(0))),
        }
    }

    /// Bytes of one counted value.
    pub fn value(&self) -> [u8; size_of::<usize>()] {
        (self.counter as *const AtomicUsize as usize).to_ne_bytes()
    }

    pub fn drops(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}
