//! The bump/free-list allocator over a single contiguous half-space.
//!
//! This plays the role of an external allocator library, folded into the
//! crate because there is no separate linkable module to consume. The
//! algorithm is a linear scan free list: entries are visited in address
//! order, the best-fitting free entry is split on
//! allocation, and a freed entry is coalesced with its immediate right
//! neighbor if that neighbor is also free. Unlike that allocator, the region
//! managed here is not a compile-time-sized array: [`Pool::init`] points the
//! allocator at a runtime-sized byte range handed to it by the heap, because
//! this crate's half-spaces are sized from a constructor argument rather
//! than a const generic.
//!
//! A block's header does double duty: while `Free`, `value_size` is the
//! block's free-list bookkeeping; once allocated, the same field is the
//! value's GC-visible total size (see [`crate::value`]).

use crate::value::{round_up, ValueHeader, ValueType, HEADER_SIZE};
use std::fmt;

/// A bump/free-list allocator over one half-space.
///
/// `Pool` does not own the memory it manages; it only remembers where the
/// currently active half-space starts and how long it is. Re-pointing it at
/// a different region (as the collector does on every flip) is [`Pool::init`].
pub struct Pool {
    base: *mut u8,
    len: usize,
}

// SAFETY: `Pool` assumes a single-threaded cooperative model: at most one
// logical activity touches the heap at a time. It is still not
// `Send`/`Sync` by default because of the raw pointer; that is intentional
// and we do not override it here.

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.len)
            .field("used", &self.mem_used())
            .finish()
    }
}

impl Pool {
    /// (Re)initializes the allocator over `region`, discarding any prior
    /// state for that region. `len` must already be a multiple of
    /// [`crate::value::ALIGNMENT`]; the caller (the heap) is responsible for
    /// rounding the half-space size down before calling this.
    ///
    /// # Safety
    /// `region` must be valid for reads and writes for `len` bytes and
    /// aligned to [`crate::value::ALIGNMENT`] for the lifetime this `Pool`
    /// is used.
    pub unsafe fn init(region: *mut u8, len: usize) -> Self {
        debug_assert_eq!(len % crate::value::ALIGNMENT, 0);
        let pool = Pool { base: region, len };
        // A single free block spans the whole region.
        // SAFETY: `region` is valid for `len` bytes per caller; offset 0 is
        // trivially in range.
        unsafe {
            pool.write_header(0, ValueHeader::free(len));
        }
        pool
    }

    /// Bytes currently in use (i.e. occupied by non-`Free` blocks) in the
    /// active half-space.
    pub fn mem_used(&self) -> usize {
        self.entries()
            .map(|offset| self.header_at(offset))
            .filter(|h| h.type_of() != ValueType::Free)
            .map(|h| h.value_size())
            .sum()
    }

    /// Returns `true` iff `ptr` lies within the currently active half-space.
    pub fn is_pool_address(&self, ptr: *mut ValueHeader) -> bool {
        let ptr = ptr as *mut u8;
        let start = self.base;
        // SAFETY: only used for address comparison, never dereferenced.
        let end = unsafe { self.base.add(self.len) };
        start <= ptr && ptr < end
    }

    /// Allocates `size` bytes (header included) from the active half-space,
    /// rounding `size` up to [`crate::value::ALIGNMENT`] first. Returns
    /// `None` if no free block is large enough.
    ///
    /// On success the returned header is in the `Free` state (matching the
    /// historical contract: the caller, typically [`crate::RefHeap::make_ref`],
    /// asserts this and then overwrites the real type).
    pub fn alloc(&mut self, size: usize) -> Option<*mut ValueHeader> {
        let size = round_up(size);

        let offset = self
            .entries()
            .filter(|&offset| self.header_at(offset).type_of() == ValueType::Free)
            .filter(|&offset| self.header_at(offset).value_size() >= size)
            .min_by_key(|&offset| self.header_at(offset).value_size())?;

        let block_size = self.header_at(offset).value_size();
        let remaining = block_size - size;

        if remaining >= HEADER_SIZE {
            // Split: carve out `size` bytes for the caller, leave a fresh
            // free block for the remainder.
            // SAFETY: `offset` came from `entries()`, which only yields
            // valid in-range header offsets.
            unsafe { self.write_header(offset, ValueHeader::free(size)) };
            // SAFETY: `offset + size` is in range: `offset + block_size` was
            // in range and `size <= block_size`.
            unsafe { self.write_header(offset + size, ValueHeader::free(remaining)) };
        } else {
            // Not enough room left for a free block's own header; absorb the
            // slack into this allocation rather than leaving an
            // unaddressable sliver.
            // SAFETY: as above.
            unsafe { self.write_header(offset, ValueHeader::free(block_size)) };
        }

        // SAFETY: `offset` is a valid header offset in the active half-space.
        Some(unsafe { self.header_ptr(offset) })
    }

    /// Returns a value's storage to the allocator, marking its header `Free`
    /// and coalescing with the immediate right neighbor if that neighbor is
    /// also free.
    ///
    /// # Safety
    /// `ptr` must currently be a live value's header pointer within this
    /// pool's active half-space (i.e. `is_pool_address(ptr)` and not already
    /// free).
    pub unsafe fn free(&mut self, ptr: *mut ValueHeader) {
        debug_assert!(self.is_pool_address(ptr));
        let offset = (ptr as usize) - (self.base as usize);
        // SAFETY: `ptr` is a valid header pointer per caller.
        let size = unsafe { (*ptr).value_size() };
        debug_assert_ne!(unsafe { (*ptr).type_of() }, ValueType::Free, "double free detected");

        let next_offset = offset + size;
        let merged_size = if next_offset < self.len {
            let next = self.header_at(next_offset);
            if next.type_of() == ValueType::Free {
                size + next.value_size()
            } else {
                size
            }
        } else {
            size
        };

        // SAFETY: `offset` is in range; `merged_size` never exceeds the
        // remaining length of the active half-space.
        unsafe { self.write_header(offset, ValueHeader::free(merged_size)) };
    }

    fn header_at(&self, offset: usize) -> ValueHeader {
        // SAFETY: `offset` is always produced by `entries()` or derived from
        // a pointer already known to lie in range; reading the fixed-size
        // header does not require it to hold a fully-initialized payload.
        unsafe { *self.header_ptr(offset) }
    }

    unsafe fn header_ptr(&self, offset: usize) -> *mut ValueHeader {
        // SAFETY: forwarded from caller.
        unsafe { self.base.add(offset).cast() }
    }

    unsafe fn write_header(&self, offset: usize, header: ValueHeader) {
        // SAFETY: forwarded from caller.
        unsafe { self.header_ptr(offset).write(header) };
    }

    fn entries(&self) -> Entries<'_> {
        Entries { pool: self, offset: 0 }
    }
}

struct Entries<'a> {
    pool: &'a Pool,
    offset: usize,
}

impl Iterator for Entries<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.offset + HEADER_SIZE > self.pool.len {
            return None;
        }
        let offset = self.offset;
        let header = self.pool.header_at(offset);
        self.offset += header.value_size();
        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pool(len: usize) -> (Vec<u64>, Pool) {
        let words = (len + 7) / 8;
        let mut backing = vec![0u64; words];
        let base = backing.as_mut_ptr().cast::<u8>();
        // SAFETY: `backing` outlives `pool` in these tests and is 8-byte
        // aligned by virtue of being a `Vec<u64>`.
        let pool = unsafe { Pool::init(base, len) };
        (backing, pool)
    }

    #[test]
    fn fresh_pool_is_one_free_block() {
        let (_backing, pool) = new_pool(64);
        assert_eq!(pool.mem_used(), 0);
        assert_eq!(pool.entries().count(), 1);
    }

    #[test]
    fn alloc_splits_and_tracks_usage() {
        let (_backing, mut pool) = new_pool(64);
        let a = pool.alloc(HEADER_SIZE).unwrap();
        assert!(pool.is_pool_address(a));
        assert_eq!(pool.mem_used(), HEADER_SIZE);
        assert_eq!(pool.entries().count(), 2);
    }

    #[test]
    fn alloc_fails_when_too_large() {
        let (_backing, mut pool) = new_pool(32);
        assert!(pool.alloc(64).is_none());
    }

    #[test]
    fn free_reclaims_and_coalesces() {
        let (_backing, mut pool) = new_pool(64);
        let a = pool.alloc(HEADER_SIZE).unwrap();
        let b = pool.alloc(HEADER_SIZE).unwrap();
        assert_eq!(pool.mem_used(), 2 * HEADER_SIZE);

        // SAFETY: `a` and `b` are both live allocations from this pool.
        unsafe { pool.free(a) };
        assert_eq!(pool.mem_used(), HEADER_SIZE);

        unsafe { pool.free(b) };
        assert_eq!(pool.mem_used(), 0);
        assert_eq!(pool.entries().count(), 1, "adjacent free blocks coalesce");
    }

    #[test]
    fn slack_too_small_to_split_is_absorbed() {
        // A pool exactly two headers wide: allocating one header's worth
        // leaves `HEADER_SIZE` free, which is just enough to split. Ask for
        // a size that leaves less than `HEADER_SIZE` remaining instead.
        let (_backing, mut pool) = new_pool(HEADER_SIZE * 2);
        let a = pool.alloc(HEADER_SIZE + crate::value::ALIGNMENT).unwrap();
        // SAFETY: `a` came from this pool's allocator.
        let size = unsafe { (*a).value_size() };
        assert_eq!(size, HEADER_SIZE * 2, "slack under HEADER_SIZE is absorbed, not split");
    }
}
