//! Dynamic queries over archetypes.
//!
//! A [`FetchSpec`] declares, in order, what each query slot yields: the
//! entity ids, mutable access to a component, or shared access to one. A
//! [`Query`] matches every archetype whose types are a superset of the
//! fetched components and yields one [`Batch`] per non-empty match, or one
//! [`Row`] per matching entity through [`Query::rows`].
//!
//! Iteration borrows the world mutably, so no structural change can happen
//! while batches or rows are alive. Each call to [`Query::iter`] or
//! [`Query::rows`] rescans the world.

use std::iter::FusedIterator;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::archetype::{Archetype, ArchetypeId, ComponentTypeSet};
use crate::column::Column;
use crate::component::ComponentTypeId;
use crate::entity::EntityId;
use crate::error::{Result, StoreError};
use crate::world::World;

/// One slot of a fetch spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fetch {
    /// The entity id column.
    Entity,
    /// Mutable access to a component column.
    Mut(ComponentTypeId),
    /// Shared access to a component column.
    Ref(ComponentTypeId),
}

impl Fetch {
    /// The component type fetched, if any.
    #[must_use]
    pub fn type_id(self) -> Option<ComponentTypeId> {
        match self {
            Self::Entity => None,
            Self::Mut(ty) | Self::Ref(ty) => Some(ty),
        }
    }
}

/// Describes the data a query yields, slot by slot.
///
/// ```
/// # use archestore::{ComponentMeta, FetchSpec, World};
/// let mut world = World::new();
/// let position = world.register_component(ComponentMeta::from_size_align(16, 8).unwrap());
/// let velocity = world.register_component(ComponentMeta::from_size_align(16, 8).unwrap());
///
/// let spec = FetchSpec::new().entity().write(position).read(velocity);
/// assert_eq!(spec.required_types(), vec![position, velocity]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
    fetches: Vec<Fetch>,
}

impl FetchSpec {
    /// Create a new empty fetch spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity id slot.
    #[must_use]
    pub fn entity(self) -> Self {
        self.push(Fetch::Entity)
    }

    /// Add a mutable component slot.
    #[must_use]
    pub fn write(self, type_id: ComponentTypeId) -> Self {
        self.push(Fetch::Mut(type_id))
    }

    /// Add a read-only component slot.
    #[must_use]
    pub fn read(self, type_id: ComponentTypeId) -> Self {
        self.push(Fetch::Ref(type_id))
    }

    #[must_use]
    pub fn push(mut self, fetch: Fetch) -> Self {
        self.fetches.push(fetch);
        self
    }

    #[must_use]
    pub fn fetches(&self) -> &[Fetch] {
        &self.fetches
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fetches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fetches.is_empty()
    }

    pub fn reads(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.fetches.iter().filter_map(|fetch| match fetch {
            Fetch::Ref(ty) => Some(*ty),
            _ => None,
        })
    }

    pub fn writes(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.fetches.iter().filter_map(|fetch| match fetch {
            Fetch::Mut(ty) => Some(*ty),
            _ => None,
        })
    }

    /// Component types an archetype must have to match, in slot order.
    #[must_use]
    pub fn required_types(&self) -> Vec<ComponentTypeId> {
        self.fetches.iter().filter_map(|fetch| fetch.type_id()).collect()
    }

    /// Rejects specs that fetch a component type more than once.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConflictingAccess`] naming the first repeated type.
    pub fn validate(&self) -> Result<()> {
        let required = self.required_types();
        for (i, ty) in required.iter().enumerate() {
            if required[..i].contains(ty) {
                return Err(StoreError::ConflictingAccess(*ty));
            }
        }
        Ok(())
    }

    /// Checks whether two specs could not run side by side.
    ///
    /// Two specs conflict when one writes a component type that the other
    /// reads or writes:
    ///
    /// ```text
    /// A.writes ∩ (B.reads ∪ B.writes) ≠ ∅  OR
    /// B.writes ∩ (A.reads ∪ A.writes) ≠ ∅
    /// ```
    #[must_use]
    pub fn conflicts_with(&self, other: &FetchSpec) -> bool {
        let touches = |spec: &FetchSpec, ty: ComponentTypeId| spec.required_types().contains(&ty);
        self.writes().any(|w| touches(other, w)) || other.writes().any(|w| touches(self, w))
    }
}

impl FromIterator<Fetch> for FetchSpec {
    fn from_iter<I: IntoIterator<Item = Fetch>>(iter: I) -> Self {
        Self {
            fetches: iter.into_iter().collect(),
        }
    }
}

/// A validated fetch spec, ready to iterate a world.
#[derive(Debug, Clone)]
pub struct Query {
    spec: FetchSpec,
    required: ComponentTypeSet,
}

impl Query {
    /// # Errors
    ///
    /// [`StoreError::ConflictingAccess`] if a component type is fetched twice.
    pub fn new(spec: FetchSpec) -> Result<Self> {
        spec.validate()?;
        let required = spec.required_types().into_iter().collect();
        Ok(Self { spec, required })
    }

    #[must_use]
    pub fn spec(&self) -> &FetchSpec {
        &self.spec
    }

    /// Fetching a type that is not registered in `world` matches nothing.
    fn is_resolvable(&self, world: &World) -> bool {
        self.required.iter().all(|ty| world.registry().contains(ty))
    }

    /// Ids of the archetypes this query currently matches, empty ones
    /// included.
    #[must_use]
    pub fn matches(&self, world: &World) -> Vec<ArchetypeId> {
        if !self.is_resolvable(world) {
            return Vec::new();
        }
        world.graph().matching_archetypes(self.required.as_slice())
    }

    /// Iterates one batch per matching, non-empty archetype.
    pub fn iter<'w, 'q>(&'q self, world: &'w mut World) -> QueryIter<'w, 'q> {
        let archetypes = if self.is_resolvable(world) {
            world.archetypes_mut().iter_mut()
        } else {
            std::slice::IterMut::default()
        };
        QueryIter {
            query: self,
            archetypes,
        }
    }

    /// Iterates one row at a time across every matching archetype.
    pub fn rows<'w, 'q>(&'q self, world: &'w mut World) -> QueryRows<'w, 'q> {
        QueryRows {
            batches: self.iter(world),
            current: None,
        }
    }
}

/// Iterator returned by [`Query::iter`].
#[derive(Debug)]
pub struct QueryIter<'w, 'q> {
    query: &'q Query,
    archetypes: std::slice::IterMut<'w, Archetype>,
}

impl<'w> Iterator for QueryIter<'w, '_> {
    type Item = Batch<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        let required = &self.query.required;
        let archetype = self
            .archetypes
            .by_ref()
            .find(|arch| !arch.is_empty() && arch.types().contains_all(required.as_slice()))?;
        Some(Batch::new(archetype, &self.query.spec))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.archetypes.len()))
    }
}

impl FusedIterator for QueryIter<'_, '_> {}

/// The rows of one archetype, viewed through a fetch spec.
#[derive(Debug)]
pub struct Batch<'w> {
    archetype: ArchetypeId,
    entities: &'w [EntityId],
    views: Vec<Option<FetchView<'w>>>,
}

impl<'w> Batch<'w> {
    fn new(archetype: &'w mut Archetype, spec: &FetchSpec) -> Self {
        let id = archetype.id();
        let indices: Vec<Option<usize>> = spec
            .fetches()
            .iter()
            .map(|fetch| fetch.type_id().and_then(|ty| archetype.column_index(ty)))
            .collect();

        let (entities, columns) = archetype.split_for_query();
        let mut slots: Vec<Option<&'w mut Column>> = columns.iter_mut().map(Some).collect();
        let views = spec
            .fetches()
            .iter()
            .zip(indices)
            .map(|(fetch, index)| match fetch {
                Fetch::Entity => Some(FetchView::Entities(entities)),
                Fetch::Mut(_) => index
                    .and_then(|i| slots[i].take())
                    .map(|column| FetchView::Mut(ColumnMut { column })),
                Fetch::Ref(_) => index
                    .and_then(|i| slots[i].take())
                    .map(|column| FetchView::Ref(ColumnRef { column })),
            })
            .collect();

        Self {
            archetype: id,
            entities,
            views,
        }
    }

    #[must_use]
    pub fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity ids by row, whether or not an entity slot was fetched.
    #[must_use]
    pub fn entities(&self) -> &'w [EntityId] {
        self.entities
    }

    /// The view for slot `index`, unless it has been taken.
    #[must_use]
    pub fn view(&self, index: usize) -> Option<&FetchView<'w>> {
        self.views.get(index)?.as_ref()
    }

    /// Takes the view for slot `index` out of the batch.
    pub fn take(&mut self, index: usize) -> Option<FetchView<'w>> {
        self.views.get_mut(index)?.take()
    }

    /// Every view, in slot order.
    #[must_use]
    pub fn into_views(self) -> Vec<Option<FetchView<'w>>> {
        self.views
    }
}

/// What one fetch slot yields for a batch.
#[derive(Debug)]
pub enum FetchView<'w> {
    Entities(&'w [EntityId]),
    Ref(ColumnRef<'w>),
    Mut(ColumnMut<'w>),
}

impl<'w> FetchView<'w> {
    #[must_use]
    pub fn into_entities(self) -> Option<&'w [EntityId]> {
        match self {
            Self::Entities(entities) => Some(entities),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_ref(self) -> Option<ColumnRef<'w>> {
        match self {
            Self::Ref(column) => Some(column),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_mut(self) -> Option<ColumnMut<'w>> {
        match self {
            Self::Mut(column) => Some(column),
            _ => None,
        }
    }
}

/// Shared access to one column of a batch.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRef<'w> {
    column: &'w Column,
}

impl<'w> ColumnRef<'w> {
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.column.type_id()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.column.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    /// Every value's bytes, back to back.
    #[must_use]
    pub fn bytes(&self) -> &'w [u8] {
        self.column.as_bytes()
    }

    #[must_use]
    pub fn row(&self, row: usize) -> Option<&'w [u8]> {
        self.column.get_bytes(row)
    }

    /// The column as a slice of `T`.
    ///
    /// # Errors
    ///
    /// Fails if `T` cannot stand in for the component, or if the component
    /// is zero-sized.
    pub fn as_slice<T: Pod>(&self) -> Result<&'w [T]> {
        let meta = self.column.meta();
        meta.check_value::<T>()?;
        bytemuck::try_cast_slice(self.column.as_bytes()).map_err(|_| StoreError::InvalidLayout {
            size: meta.size(),
            align: meta.align(),
        })
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.column.as_ptr()
    }
}

/// Mutable access to one column of a batch.
#[derive(Debug)]
pub struct ColumnMut<'w> {
    column: &'w mut Column,
}

impl<'w> ColumnMut<'w> {
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.column.type_id()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.column.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    /// Every value's bytes, back to back.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.column.as_bytes()
    }

    /// Every value's bytes, back to back, mutably.
    #[must_use]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.column.as_bytes_mut()
    }

    #[must_use]
    pub fn row_mut(&mut self, row: usize) -> Option<&mut [u8]> {
        self.column.get_bytes_mut(row)
    }

    /// The column as a mutable slice of `T`.
    ///
    /// # Errors
    ///
    /// As for [`ColumnRef::as_slice`].
    pub fn as_mut_slice<T: Pod>(&mut self) -> Result<&mut [T]> {
        let meta = self.column.meta().clone();
        meta.check_value::<T>()?;
        bytemuck::try_cast_slice_mut(self.column.as_bytes_mut()).map_err(|_| {
            StoreError::InvalidLayout {
                size: meta.size(),
                align: meta.align(),
            }
        })
    }

    /// Like [`ColumnMut::bytes_mut`], keeping the batch lifetime.
    #[must_use]
    pub fn into_bytes_mut(self) -> &'w mut [u8] {
        self.column.as_bytes_mut()
    }

    /// Like [`ColumnMut::as_mut_slice`], keeping the batch lifetime.
    pub fn into_mut_slice<T: Pod>(self) -> Result<&'w mut [T]> {
        let meta = self.column.meta().clone();
        meta.check_value::<T>()?;
        bytemuck::try_cast_slice_mut(self.column.as_bytes_mut()).map_err(|_| {
            StoreError::InvalidLayout {
                size: meta.size(),
                align: meta.align(),
            }
        })
    }

    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.column.as_mut_ptr()
    }
}

/// Iterator returned by [`Query::rows`].
#[derive(Debug)]
pub struct QueryRows<'w, 'q> {
    batches: QueryIter<'w, 'q>,
    current: Option<BatchRows<'w>>,
}

impl<'w> Iterator for QueryRows<'w, '_> {
    type Item = Row<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.current.as_mut().and_then(BatchRows::next_row) {
                return Some(row);
            }
            self.current = Some(BatchRows::new(self.batches.next()?));
        }
    }
}

impl FusedIterator for QueryRows<'_, '_> {}

/// Splits the views of one batch into rows.
#[derive(Debug)]
struct BatchRows<'w> {
    archetype: ArchetypeId,
    entities: std::slice::Iter<'w, EntityId>,
    cursors: Vec<Option<Cursor<'w>>>,
}

#[derive(Debug)]
enum Cursor<'w> {
    Entity,
    Ref { rest: &'w [u8], size: usize },
    Mut { rest: &'w mut [u8], size: usize },
}

impl<'w> BatchRows<'w> {
    fn new(batch: Batch<'w>) -> Self {
        let archetype = batch.archetype();
        let entities = batch.entities().iter();
        let cursors = batch
            .into_views()
            .into_iter()
            .map(|view| {
                view.map(|view| match view {
                    FetchView::Entities(_) => Cursor::Entity,
                    FetchView::Ref(column) => Cursor::Ref {
                        rest: column.bytes(),
                        size: column.column.meta().size(),
                    },
                    FetchView::Mut(column) => {
                        let size = column.column.meta().size();
                        Cursor::Mut {
                            rest: column.into_bytes_mut(),
                            size,
                        }
                    }
                })
            })
            .collect();
        Self {
            archetype,
            entities,
            cursors,
        }
    }

    fn next_row(&mut self) -> Option<Row<'w>> {
        let entity = *self.entities.next()?;
        let views = self
            .cursors
            .iter_mut()
            .map(|cursor| cursor.as_mut().map(|cursor| cursor.advance(entity)))
            .collect();
        Some(Row {
            archetype: self.archetype,
            entity,
            views,
        })
    }
}

impl<'w> Cursor<'w> {
    fn advance(&mut self, entity: EntityId) -> RowView<'w> {
        match self {
            Self::Entity => RowView::Entity(entity),
            Self::Ref { rest, size } => {
                let bytes: &'w [u8] = *rest;
                let (value, tail) = bytes.split_at(*size);
                *rest = tail;
                RowView::Ref(value)
            }
            Self::Mut { rest, size } => {
                let (value, tail) = std::mem::take(rest).split_at_mut(*size);
                *rest = tail;
                RowView::Mut(value)
            }
        }
    }
}

/// One matching entity, viewed through a fetch spec.
#[derive(Debug)]
pub struct Row<'w> {
    archetype: ArchetypeId,
    entity: EntityId,
    views: Vec<Option<RowView<'w>>>,
}

impl<'w> Row<'w> {
    #[must_use]
    pub fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// The entity stored in this row, whether or not an entity slot was
    /// fetched.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    #[must_use]
    pub fn view(&self, index: usize) -> Option<&RowView<'w>> {
        self.views.get(index)?.as_ref()
    }

    /// Takes the view for slot `index` out of the row.
    pub fn take(&mut self, index: usize) -> Option<RowView<'w>> {
        self.views.get_mut(index)?.take()
    }

    #[must_use]
    pub fn into_views(self) -> Vec<Option<RowView<'w>>> {
        self.views
    }
}

/// What one fetch slot yields for a single row.
#[derive(Debug)]
pub enum RowView<'w> {
    Entity(EntityId),
    Ref(&'w [u8]),
    Mut(&'w mut [u8]),
}

impl<'w> RowView<'w> {
    #[must_use]
    pub fn into_entity(self) -> Option<EntityId> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// The component bytes, for either kind of component slot.
    #[must_use]
    pub fn into_ref(self) -> Option<&'w [u8]> {
        match self {
            Self::Ref(bytes) => Some(bytes),
            Self::Mut(bytes) => Some(bytes),
            Self::Entity(_) => None,
        }
    }

    #[must_use]
    pub fn into_mut(self) -> Option<&'w mut [u8]> {
        match self {
            Self::Mut(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The component value as a `T`.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidLayout`] if `T` does not fit the value's bytes.
    pub fn into_value<T: Pod>(self) -> Result<Option<&'w T>> {
        self.into_ref().map(cast_value::<T>).transpose()
    }

    /// The component value as a mutable `T`, for mutable slots only.
    ///
    /// # Errors
    ///
    /// As for [`RowView::into_value`].
    pub fn into_value_mut<T: Pod>(self) -> Result<Option<&'w mut T>> {
        self.into_mut()
            .map(|bytes| {
                bytemuck::try_from_bytes_mut(bytes).map_err(|_| value_layout_error::<T>())
            })
            .transpose()
    }
}

fn cast_value<T: Pod>(bytes: &[u8]) -> Result<&T> {
    bytemuck::try_from_bytes(bytes).map_err(|_| value_layout_error::<T>())
}

fn value_layout_error<T>() -> StoreError {
    StoreError::InvalidLayout {
        size: std::mem::size_of::<T>(),
        align: std::mem::align_of::<T>(),
    }
}
