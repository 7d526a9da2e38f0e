//! The reference table: the indirection layer between handles and the
//! values they name.
//!
//! Each entry is either empty or a raw pointer into the active half-space.
//! `num_refs`, the high-water mark, is simply `entries.len()` here: slots
//! are reused (see [`RefTable::assign`]) rather than shrinking the vector,
//! so the table never needs to renumber existing handles.

use crate::error::RefTableError;
use crate::reference::Reference;
use crate::value::ValueHeader;

/// The reference table.
pub(crate) struct RefTable {
    entries: Vec<Option<*mut ValueHeader>>,
    initial_capacity: usize,
}

impl RefTable {
    pub fn new(initial_capacity: usize) -> Self {
        RefTable {
            entries: Vec::new(),
            initial_capacity,
        }
    }

    /// The high-water mark: entries `0..num_refs` are either empty or live.
    pub fn num_refs(&self) -> usize {
        self.entries.len()
    }

    /// Number of non-empty entries.
    pub fn refs_used(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// The pointer stored at `r`, if `r` is in range and not empty.
    pub fn get(&self, r: Reference) -> Option<*mut ValueHeader> {
        self.entries.get(r as usize).copied().flatten()
    }

    /// Overwrites the pointer stored at `r`. `r` must already be in range
    /// (typically because it was just returned by [`RefTable::assign`] or
    /// read via [`RefTable::get`]).
    pub fn set(&mut self, r: Reference, ptr: *mut ValueHeader) {
        self.entries[r as usize] = Some(ptr);
    }

    /// Empties the entry at `r`, freeing its index for reuse.
    pub fn clear(&mut self, r: Reference) {
        self.entries[r as usize] = None;
    }

    /// Every non-empty `(handle, pointer)` pair, in ascending handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Reference, *mut ValueHeader)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|p| (i as Reference, p)))
    }

    /// The handle whose entry points at `ptr`. Panics if none does: callers
    /// are expected to only ask this for a pointer they just obtained from
    /// a live dereference, and the historical contract this reimplements
    /// treats "value has no reference" as a fatal invariant violation, not
    /// a recoverable condition.
    pub fn find(&self, ptr: *mut ValueHeader) -> Reference {
        self.entries
            .iter()
            .position(|e| *e == Some(ptr))
            .map(|i| i as Reference)
            .expect("value has no reference")
    }

    /// Assigns a handle to `ptr`, preferring the lowest-indexed empty slot
    /// before growing the table. This is what keeps handle values bounded
    /// by the high-water live-set size rather than growing unboundedly.
    pub fn assign(&mut self, ptr: *mut ValueHeader) -> Reference {
        if let Some(i) = self.entries.iter().position(|e| e.is_none()) {
            self.entries[i] = Some(ptr);
            return i as Reference;
        }

        self.grow();
        let idx = self.entries.len();
        self.entries.push(Some(ptr));
        idx as Reference
    }

    /// Doubles the table's capacity (or seeds it at `initial_capacity` if
    /// this is the first growth). Failure to grow is fatal: without a slot
    /// for a new handle, no further allocation can make progress.
    fn grow(&mut self) {
        let current_cap = self.entries.capacity();
        let new_cap = if current_cap == 0 {
            self.initial_capacity
        } else {
            current_cap * 2
        };
        let additional = new_cap.saturating_sub(current_cap);
        if additional == 0 {
            return;
        }
        if self.entries.try_reserve_exact(additional).is_err() {
            let err = RefTableError::TableGrowthFailed {
                attempted_capacity: new_cap,
            };
            tracing::error!(attempted_capacity = new_cap, "{err}");
            panic!("{err}");
        }
        tracing::trace!(new_capacity = new_cap, "grew reference table");
    }
}
