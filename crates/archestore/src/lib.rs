//! # archestore
//!
//! Archetype storage for entity-component-system workloads whose component
//! types are described at runtime rather than by Rust types.
//!
//! This crate provides:
//!
//! - [`EntityId`] and [`EntityAllocator`]: generational entity identifiers.
//! - [`ComponentMeta`] and [`ComponentTypeId`]: runtime component layouts.
//!   Component types are themselves entities.
//! - [`Archetype`] and [`ArchetypeGraph`]: columnar storage grouped by
//!   component set, with cached add/remove transitions.
//! - [`World`]: spawn, despawn, and component add/remove/get.
//! - [`EntityBuilder`]: single-step construction of multi-component entities.
//! - [`FetchSpec`] and [`Query`]: dynamic queries yielding per-archetype
//!   [`Batch`]es or per-entity [`Row`]s.
//!
//! ```
//! use archestore::{ComponentMeta, FetchSpec, FetchView, World};
//!
//! let mut world = World::new();
//! let health = world.register_component(ComponentMeta::from_size_align(4, 4)?.named("Health"));
//!
//! let e = world.spawn_builder().with_value(health, 100u32)?.build();
//!
//! let query = world.query(FetchSpec::new().write(health))?;
//! for mut batch in query.iter(&mut world) {
//!     if let Some(mut column) = batch.take(0).and_then(FetchView::into_mut) {
//!         for hp in column.as_mut_slice::<u32>()? {
//!             *hp -= 1;
//!         }
//!     }
//! }
//!
//! assert_eq!(world.get_component::<u32>(e, health)?, Some(&99));
//! # Ok::<(), archestore::StoreError>(())
//! ```

pub mod archetype;
pub mod builder;
pub mod column;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod query;
pub mod world;

pub use archetype::{Archetype, ArchetypeId, ComponentTypeSet};
pub use builder::EntityBuilder;
pub use column::Column;
pub use component::{
    ComponentMeta, ComponentMetaHandle, ComponentRegistry, ComponentTypeId, DropFn,
};
pub use config::WorldConfig;
pub use entity::{EntityAllocator, EntityId};
pub use error::{Result, StoreError};
pub use graph::ArchetypeGraph;
pub use query::{
    Batch, ColumnMut, ColumnRef, Fetch, FetchSpec, FetchView, Query, QueryIter, QueryRows, Row,
    RowView,
};
pub use world::{ComponentPtr, EntityLocation, World};
