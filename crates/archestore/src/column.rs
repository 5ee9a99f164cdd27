//! Type-erased component columns.
//!
//! A [`Column`] stores values of one component type contiguously, laid out
//! and aligned according to the type's [`ComponentMeta`](crate::ComponentMeta).
//! Values move in and out bitwise. Whenever the column itself discards a value
//! it runs the registered destructor.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use crate::component::{ComponentMetaHandle, ComponentTypeId};

/// Rows allocated on a column's first growth.
const MIN_CAPACITY: usize = 4;

/// A column in an archetype, storing components of a single type.
///
/// Invariant: rows `0..len` hold initialised values owned by the column.
pub struct Column {
    type_id: ComponentTypeId,
    meta: ComponentMetaHandle,
    data: NonNull<u8>,
    /// Allocated rows. `usize::MAX` for zero-sized components.
    capacity: usize,
    len: usize,
}

impl Column {
    /// Create a new empty column for the given component type.
    pub(crate) fn new(type_id: ComponentTypeId, meta: ComponentMetaHandle) -> Self {
        let capacity = if meta.is_zero_sized() { usize::MAX } else { 0 };
        Self {
            type_id,
            data: dangling(meta.align()),
            meta,
            capacity,
            len: 0,
        }
    }

    pub(crate) fn with_capacity(
        type_id: ComponentTypeId,
        meta: ComponentMetaHandle,
        capacity: usize,
    ) -> Self {
        let mut column = Self::new(type_id, meta);
        column.reserve(capacity);
        column
    }

    /// The component type stored in this column.
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    #[must_use]
    pub fn meta(&self) -> &ComponentMetaHandle {
        &self.meta
    }

    /// Returns the number of component instances stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if this column contains no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Makes room for at least `additional` more rows.
    ///
    /// Aborts through [`alloc::handle_alloc_error`] if the allocator fails.
    pub fn reserve(&mut self, additional: usize) {
        let required = self
            .len
            .checked_add(additional)
            .unwrap_or_else(|| capacity_overflow());
        if required <= self.capacity {
            return;
        }

        let new_capacity = required
            .max(self.capacity.saturating_mul(2))
            .max(MIN_CAPACITY);
        self.grow_to(new_capacity);
    }

    fn grow_to(&mut self, new_capacity: usize) {
        let new_layout = self.layout_for(new_capacity);
        let ptr = if self.capacity == 0 {
            // SAFETY: zero-sized columns never grow, so the layout is non-empty.
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = self.layout_for(self.capacity);
            // SAFETY: `data` was allocated with `old_layout`; `layout_for`
            // validated the new size against the same alignment.
            unsafe { alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size()) }
        };

        self.data = NonNull::new(ptr).unwrap_or_else(|| alloc::handle_alloc_error(new_layout));
        self.capacity = new_capacity;
    }

    fn layout_for(&self, rows: usize) -> Layout {
        self.meta
            .size()
            .checked_mul(rows)
            .and_then(|bytes| Layout::from_size_align(bytes, self.meta.align()).ok())
            .unwrap_or_else(|| capacity_overflow())
    }

    /// Pointer to `row`. `row` may equal `len` when a slot has been reserved.
    fn ptr_at(&self, row: usize) -> NonNull<u8> {
        debug_assert!(row <= self.len && row <= self.capacity);
        // SAFETY: `row` lies within the allocation (or is zero bytes away
        // from the dangling pointer for zero-sized components).
        unsafe { self.data.add(row * self.meta.size()) }
    }

    /// Raw pointer to the first row.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Mutable raw pointer to the first row.
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// Every stored value, back to back.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: rows `0..len` are initialised and owned by this column.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len * self.meta.size()) }
    }

    /// Every stored value, back to back, mutably.
    #[must_use]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `as_bytes`; `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.len * self.meta.size()) }
    }

    /// Raw bytes of the component at `row`.
    #[must_use]
    pub fn get_bytes(&self, row: usize) -> Option<&[u8]> {
        if row >= self.len {
            return None;
        }
        let size = self.meta.size();
        Some(&self.as_bytes()[row * size..(row + 1) * size])
    }

    /// Mutable raw bytes of the component at `row`.
    #[must_use]
    pub fn get_bytes_mut(&mut self, row: usize) -> Option<&mut [u8]> {
        if row >= self.len {
            return None;
        }
        let size = self.meta.size();
        Some(&mut self.as_bytes_mut()[row * size..(row + 1) * size])
    }

    pub(crate) fn get_ptr(&self, row: usize) -> Option<NonNull<u8>> {
        (row < self.len).then(|| self.ptr_at(row))
    }

    /// Moves one value into the column.
    ///
    /// # Safety
    ///
    /// `src` must point to `meta().size()` readable bytes forming a value of
    /// this column's component type. Ownership of that value moves into the
    /// column; the caller must not drop it.
    pub(crate) unsafe fn push_raw(&mut self, src: *const u8) {
        self.reserve(1);
        let dst = self.ptr_at(self.len);
        // SAFETY: `reserve` made room for one row; `src` is valid per the
        // caller and cannot overlap memory this column owns exclusively.
        unsafe { ptr::copy_nonoverlapping(src, dst.as_ptr(), self.meta.size()) };
        self.len += 1;
    }

    /// Copies one value's bytes into the column.
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.meta.size());
        // SAFETY: values are opaque byte patterns for this store, and the
        // slice covers exactly one value.
        unsafe { self.push_raw(bytes.as_ptr()) }
    }

    /// Destroys the value at `row` and writes a new one in its place.
    ///
    /// # Safety
    ///
    /// Same contract as [`Column::push_raw`] for `src`.
    pub(crate) unsafe fn replace_raw(&mut self, row: usize, src: *const u8) {
        assert!(row < self.len, "row {row} out of bounds for column of length {}", self.len);
        let dst = self.ptr_at(row).as_ptr();
        // SAFETY: `dst` holds a live value that is overwritten right after.
        unsafe {
            self.meta.drop_in_place(dst);
            ptr::copy_nonoverlapping(src, dst, self.meta.size());
        }
    }

    /// Destroys the value at `row`, filling the hole with the last row.
    pub(crate) fn swap_remove(&mut self, row: usize) {
        assert!(row < self.len, "row {row} out of bounds for column of length {}", self.len);
        let last = self.len - 1;
        let hole = self.ptr_at(row).as_ptr();
        // SAFETY: `hole` holds a live value; after the destructor runs it is
        // refilled bitwise from the last row, which then leaves the column.
        unsafe {
            self.meta.drop_in_place(hole);
            if row != last {
                ptr::copy_nonoverlapping(self.ptr_at(last).as_ptr(), hole, self.meta.size());
            }
        }
        self.len = last;
    }

    /// Moves the value at `row` to the end of `dst` without destroying it,
    /// filling the hole with the last row.
    pub(crate) fn swap_remove_into(&mut self, row: usize, dst: &mut Column) {
        assert!(row < self.len, "row {row} out of bounds for column of length {}", self.len);
        assert_eq!(self.type_id, dst.type_id, "columns store different component types");
        let last = self.len - 1;
        let src = self.ptr_at(row).as_ptr();
        // SAFETY: both columns store the same component type, so the value
        // is valid for `dst`. Ownership moves there and the slot is refilled
        // from the last row before `len` shrinks.
        unsafe {
            dst.push_raw(src);
            if row != last {
                ptr::copy_nonoverlapping(self.ptr_at(last).as_ptr(), src, self.meta.size());
            }
        }
        self.len = last;
    }

    /// Forgets every value without running destructors.
    ///
    /// # Safety
    ///
    /// Ownership of all stored values must already have moved elsewhere.
    pub(crate) unsafe fn forget_rows(&mut self) {
        self.len = 0;
    }

    /// Destroys every value, keeping the allocation.
    pub(crate) fn clear(&mut self) {
        let len = self.len;
        self.len = 0;
        for row in 0..len {
            // SAFETY: rows `0..len` held live values; `len` is already zero
            // so none of them is visited twice.
            unsafe { self.meta.drop_in_place(self.data.add(row * self.meta.size()).as_ptr()) };
        }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        self.clear();
        if !self.meta.is_zero_sized() && self.capacity != 0 {
            let layout = self.layout_for(self.capacity);
            // SAFETY: `data` was allocated by `grow_to` with this layout.
            unsafe { alloc::dealloc(self.data.as_ptr(), layout) };
        }
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("type_id", &self.type_id)
            .field("component", &self.meta.name())
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn dangling(align: usize) -> NonNull<u8> {
    // SAFETY: alignments are non-zero powers of two.
    unsafe { NonNull::new_unchecked(ptr::without_provenance_mut(align)) }
}

#[cold]
fn capacity_overflow() -> ! {
    panic!("column capacity overflow")
}
