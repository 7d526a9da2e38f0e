//! The managed heap: reference table, pool allocator, and stop-and-copy
//! collector bound together behind one handle API.
//!
//! The historical interface this crate reimplements exposes `init_refs`,
//! `make_ref`, `deref`, and friends as free functions over implicit global
//! state (a single static pool per process). This crate instead bundles
//! that state into [`RefHeap`] so a process can hold more than one heap and
//! so the state is subject to ordinary Rust ownership, but every method
//! name and contract below is the one the spec names.

use crate::collector::RootSet;
use crate::config::HeapConfig;
use crate::pool::Pool;
use crate::reference::{is_sentinel, Reference, NULL_REF};
use crate::table::RefTable;
use crate::value::{round_up, ValueHeader, ValueType, HEADER_SIZE, REF_SIZE};
use std::ptr;

/// Which physical half of the backing storage is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Half {
    A,
    B,
}

impl Half {
    fn other(self) -> Half {
        match self {
            Half::A => Half::B,
            Half::B => Half::A,
        }
    }
}

/// A managed heap: a split pool, a reference table, and the collector that
/// keeps them consistent.
pub struct RefHeap {
    /// Backing storage for both half-spaces, as `u64`s purely so the
    /// allocation is guaranteed 8-byte aligned (matching the spec's
    /// `ALIGNMENT`) without a manual `repr(align)` wrapper.
    storage: Box<[u64]>,
    half_len: usize,
    active: Half,
    pool: Pool,
    table: RefTable,
    config: HeapConfig,
}

impl RefHeap {
    /// Initializes a heap over a pool of `config.memory_size` bytes, split
    /// into two equal half-spaces. The reference table starts empty.
    ///
    /// This is `init_refs` from the handle API: the byte region the spec
    /// has the caller supply (`memory_pool`) is instead owned by the
    /// returned `RefHeap`, since there is no external allocator for this
    /// crate to borrow one from.
    pub fn init_refs(config: HeapConfig) -> Self {
        let half_len = config.memory_size / 2 / crate::value::ALIGNMENT * crate::value::ALIGNMENT;
        let total_bytes = half_len * 2;
        let words = (total_bytes + 7) / 8;
        let mut storage = vec![0u64; words].into_boxed_slice();
        let base = storage.as_mut_ptr().cast::<u8>();

        // SAFETY: `base` is valid for `half_len` bytes: `storage` holds at
        // least `total_bytes >= half_len` bytes and outlives `pool`, which
        // is stored alongside it in the same struct.
        let pool = unsafe { Pool::init(base, half_len) };

        tracing::debug!(memory_size = config.memory_size, half_len, "initialized heap");

        RefHeap {
            storage,
            half_len,
            active: Half::A,
            pool,
            table: RefTable::new(config.initial_ref_table_capacity),
            config,
        }
    }

    /// Returns a pointer to the start of half-space `half`.
    fn half_ptr(&mut self, half: Half) -> *mut u8 {
        let base = self.storage.as_mut_ptr().cast::<u8>();
        match half {
            Half::A => base,
            // SAFETY: `storage` holds `2 * half_len` bytes, so offsetting
            // by `half_len` stays in bounds.
            Half::B => unsafe { base.add(self.half_len) },
        }
    }

    /// Tears the heap down. Because the pool and the table are owned by
    /// `self`, dropping already releases both; this method exists to match
    /// the handle API's `close_refs` name and to log the teardown.
    pub fn close_refs(self) {
        tracing::debug!(refs_used = self.table.refs_used(), "closing heap");
    }

    /// Bytes currently in use in the active half-space.
    pub fn mem_used(&self) -> usize {
        self.pool.mem_used()
    }

    /// Number of non-empty reference-table entries.
    pub fn refs_used(&self) -> usize {
        self.table.refs_used()
    }

    /// Attempts to allocate `size` bytes (header included) for a value of
    /// shape `ty` and assign it a handle. `size` is rounded up to 8 bytes.
    /// Returns [`NULL_REF`] if the active half-space cannot satisfy the
    /// request; the caller is expected to run [`RefHeap::collect_garbage`]
    /// and retry.
    pub fn make_ref(&mut self, ty: ValueType, size: usize) -> Reference {
        debug_assert!(size >= HEADER_SIZE, "value size must include the header");
        let size = round_up(size);
        let Some(ptr) = self.pool.alloc(size) else {
            tracing::trace!(?ty, size, "allocation failed: active half-space exhausted");
            return NULL_REF;
        };

        // SAFETY: `ptr` was just returned by `Pool::alloc`, which only
        // returns freshly-carved `Free` blocks of at least `size` bytes.
        unsafe {
            debug_assert_eq!((*ptr).type_of(), ValueType::Free);
            (*ptr).set_type(ty);
            (*ptr).set_ref_count(1);

            let payload_len = (*ptr).value_size() - HEADER_SIZE;
            let payload = (ptr as *mut u8).add(HEADER_SIZE);
            ptr::write_bytes(payload, 0xCC, payload_len);
        }

        let r = self.table.assign(ptr);
        tracing::trace!(handle = r, ?ty, size, "allocated value");
        r
    }

    /// Dereferences `r` to its current header pointer.
    ///
    /// # Safety
    /// `r` must not be [`crate::NULL_REF`] or [`crate::TOMBSTONE_REF`], and
    /// the returned pointer is only valid until the next operation that may
    /// allocate or collect (the collector may move the value it points at).
    pub unsafe fn deref(&self, r: Reference) -> *mut ValueHeader {
        debug_assert!(!is_sentinel(r), "deref of a sentinel handle");
        debug_assert!((r as usize) < self.table.num_refs(), "handle out of range: {r}");
        let ptr = self
            .table
            .get(r)
            .unwrap_or_else(|| panic!("deref of empty reference table entry {r}"));
        debug_assert!(
            self.pool.is_pool_address(ptr),
            "dereferenced value outside the active half-space"
        );
        ptr
    }

    /// The handle whose entry currently points at `ptr`. Panics if none
    /// does.
    pub fn get_ref(&self, ptr: *mut ValueHeader) -> Reference {
        self.table.find(ptr)
    }

    /// Increments `r`'s reference count. A no-op for sentinel handles.
    pub fn incref(&mut self, r: Reference) {
        if is_sentinel(r) {
            return;
        }
        // SAFETY: `r` is non-sentinel; `deref` asserts it is in range and
        // live.
        unsafe {
            let ptr = self.deref(r);
            (*ptr).set_ref_count((*ptr).ref_count() + 1);
        }
    }

    /// Decrements `r`'s reference count. A no-op for sentinel handles. When
    /// a count reaches zero, every child handle is decremented in turn
    /// (children first, since freeing reads the parent's fields), the
    /// storage is returned to the pool, and the table entry is emptied.
    ///
    /// Implemented as an explicit worklist rather than native recursion, so
    /// that a long acyclic chain cannot exhaust the call stack.
    pub fn decref(&mut self, r: Reference) {
        if is_sentinel(r) {
            return;
        }

        let mut worklist = vec![r];
        while let Some(r) = worklist.pop() {
            if is_sentinel(r) {
                continue;
            }
            // SAFETY: non-sentinel handle, asserted in range and live by
            // `deref`.
            unsafe {
                let ptr = self.deref(r);
                let count = (*ptr).ref_count();
                debug_assert!(count >= 1, "decref of a value with ref_count 0");
                if count > 1 {
                    (*ptr).set_ref_count(count - 1);
                    continue;
                }

                // Reaching zero: queue children before the parent's
                // storage is freed, since freeing overwrites its header.
                crate::value::visit_children(ptr, |child| worklist.push(child));
                self.pool.free(ptr);
                self.table.clear(r);
                tracing::trace!(handle = r, "freed value: ref_count reached zero");
            }
        }
    }

    /// Runs a full stop-and-copy collection against `roots`.
    ///
    /// Four phases: the inactive half-space becomes the destination, every
    /// root-reachable value is
    /// copied there with its reference count re-derived from the copy pass
    /// rather than trusted from before collection, any table entry left
    /// pointing at the abandoned half-space (cyclic garbage unreachable from
    /// roots) is dropped, and the two half-spaces swap roles.
    pub fn collect_garbage(&mut self, roots: &impl RootSet) {
        if self.config.interactive {
            eprintln!("Collecting garbage.");
        }
        let old_used = self.pool.mem_used();
        tracing::debug!("collecting garbage");

        // Phase 1: flip.
        let destination = self.active.other();
        let new_base = self.half_ptr(destination);
        // SAFETY: `new_base` points at `half_len` bytes of storage we own;
        // the inactive half-space holds no live values between collections.
        self.pool = unsafe { Pool::init(new_base, self.half_len) };
        tracing::trace!("flipped to new active half-space");

        // Phase 2: evacuate from roots.
        let mut root_handles = Vec::new();
        roots.foreach_global(|_name, r| root_handles.push(r));
        for r in root_handles {
            self.evacuate(r);
        }

        // Phase 3: sweep.
        let stale: Vec<Reference> = self
            .table
            .iter()
            .filter(|&(_, ptr)| !self.pool.is_pool_address(ptr))
            .map(|(r, _)| r)
            .collect();
        let swept = stale.len();
        for r in stale {
            self.table.clear(r);
        }
        tracing::trace!(swept, "swept unreachable table entries");

        // Phase 4: commit.
        self.active = destination;

        if self.config.interactive {
            eprintln!("Reclaimed {} bytes of garbage.", old_used.saturating_sub(self.pool.mem_used()));
        }
    }

    /// Copies `root`'s target into the new active half-space if it has not
    /// already been moved there, or increments its (already-reset) count if
    /// it has, then does the same for every child reachable from it.
    ///
    /// Implemented as an explicit worklist rather than native recursion, so
    /// that a long chain evacuated during collection cannot exhaust the call
    /// stack (mirrors `decref`). Children are pushed only on first
    /// evacuation of a value; a revisit just increments its count.
    fn evacuate(&mut self, root: Reference) {
        let mut worklist = vec![root];
        while let Some(r) = worklist.pop() {
            if is_sentinel(r) {
                continue;
            }
            let Some(ptr) = self.table.get(r) else {
                // Swept already, or never assigned; nothing to evacuate.
                continue;
            };

            if self.pool.is_pool_address(ptr) {
                // Already evacuated by an earlier visit: one more incoming edge.
                // SAFETY: `ptr` is a live header in the new active half-space.
                unsafe { (*ptr).set_ref_count((*ptr).ref_count() + 1) };
                continue;
            }

            // SAFETY: `ptr` is the value's header at its pre-collection
            // location, still valid for reading (the old half-space has not
            // been reinitialized yet).
            let size = unsafe { (*ptr).value_size() };
            let new_ptr = self
                .pool
                .alloc(size)
                .expect("destination half-space has room for every live survivor");

            // SAFETY: `ptr` and `new_ptr` are both valid for `size` bytes and
            // do not overlap (they are in different half-spaces).
            unsafe {
                ptr::copy_nonoverlapping(ptr as *const u8, new_ptr as *mut u8, size);
                (*new_ptr).set_ref_count(1);
            }
            self.table.set(r, new_ptr);

            // SAFETY: `new_ptr` is a freshly evacuated, fully initialized copy.
            unsafe { crate::value::visit_children(new_ptr, |c| worklist.push(c)) };
        }
    }

    // ---- convenience constructors for the composite shapes ----
    // These exist so tests (and small embedders without their own value
    // types) can build the shapes the collector traverses without hand
    // rolling pointer arithmetic. They never call `incref`: storing a
    // handle into a slot is a plain write, and the caller is responsible
    // for reference counting the edges they create.

    /// Allocates a scalar integer value.
    pub fn make_int(&mut self, value: i64) -> Reference {
        let r = self.make_ref(ValueType::Int, HEADER_SIZE + std::mem::size_of::<i64>());
        if r != NULL_REF {
            // SAFETY: `r` was just allocated with an `i64`-sized payload.
            unsafe {
                let ptr = self.deref(r);
                (ptr as *mut u8).add(HEADER_SIZE).cast::<i64>().write_unaligned(value);
            }
        }
        r
    }

    /// Reads an `Int` value's payload.
    pub fn int_value(&self, r: Reference) -> i64 {
        // SAFETY: `r` must name a live `Int` value; asserted below.
        unsafe {
            let ptr = self.deref(r);
            debug_assert_eq!((*ptr).type_of(), ValueType::Int);
            (ptr as *mut u8).add(HEADER_SIZE).cast::<i64>().read_unaligned()
        }
    }

    /// Allocates a `RefArray` of `capacity` slots, all initialized to
    /// [`crate::NULL_REF`].
    pub fn make_ref_array(&mut self, capacity: usize) -> Reference {
        let r = self.make_ref(ValueType::RefArray, HEADER_SIZE + capacity * REF_SIZE);
        if r != NULL_REF {
            // SAFETY: `r` was just allocated with `capacity` child slots.
            unsafe {
                let ptr = self.deref(r);
                for i in 0..capacity {
                    crate::value::set_child(ptr, i, NULL_REF);
                }
            }
        }
        r
    }

    /// Reads slot `index` of a `RefArray`.
    pub fn array_get(&self, r: Reference, index: usize) -> Reference {
        // SAFETY: caller is responsible for `index` being in range for `r`'s
        // capacity; `deref` asserts `r` is live.
        unsafe { crate::value::get_child(self.deref(r), index) }
    }

    /// Writes slot `index` of a `RefArray`. Does not touch reference counts;
    /// see the note above `make_int`.
    pub fn array_set(&mut self, r: Reference, index: usize, value: Reference) {
        // SAFETY: see `array_get`.
        unsafe { crate::value::set_child(self.deref(r), index, value) };
    }

    /// Allocates a `List` backed by `array` (a `RefArray` handle).
    pub fn make_list(&mut self, array: Reference) -> Reference {
        let r = self.make_ref(ValueType::List, HEADER_SIZE + REF_SIZE);
        if r != NULL_REF {
            // SAFETY: `r` was just allocated with one child slot.
            unsafe { crate::value::set_child(self.deref(r), 0, array) };
        }
        r
    }

    /// The backing `RefArray` handle of a `List`.
    pub fn list_backing(&self, r: Reference) -> Reference {
        // SAFETY: caller must name a live `List`.
        unsafe { crate::value::get_child(self.deref(r), 0) }
    }

    /// Allocates a `Dict` backed by a keys `RefArray` and a values
    /// `RefArray`.
    pub fn make_dict(&mut self, keys: Reference, values: Reference) -> Reference {
        let r = self.make_ref(ValueType::Dict, HEADER_SIZE + 2 * REF_SIZE);
        if r != NULL_REF {
            // SAFETY: `r` was just allocated with two child slots.
            unsafe {
                let ptr = self.deref(r);
                crate::value::set_child(ptr, 0, keys);
                crate::value::set_child(ptr, 1, values);
            }
        }
        r
    }

    /// The keys/values `RefArray` handles of a `Dict`.
    pub fn dict_backing(&self, r: Reference) -> (Reference, Reference) {
        // SAFETY: caller must name a live `Dict`.
        unsafe {
            let ptr = self.deref(r);
            (crate::value::get_child(ptr, 0), crate::value::get_child(ptr, 1))
        }
    }

    /// The shape tag of a live value.
    pub fn type_of(&self, r: Reference) -> ValueType {
        // SAFETY: caller must name a live value.
        unsafe { (*self.deref(r)).type_of() }
    }

    /// The current reference count of a live value.
    pub fn ref_count(&self, r: Reference) -> u32 {
        // SAFETY: caller must name a live value.
        unsafe { (*self.deref(r)).ref_count() }
    }
}
