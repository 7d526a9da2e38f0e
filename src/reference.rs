//! The opaque handle type used to address values in the heap.
//!
//! A [`Reference`] is a dense small integer index into the reference table.
//! It never points directly at a value: the table is the only thing that
//! knows where a value currently lives, which is what lets the collector
//! move values around without invalidating handles held by the evaluator.

/// An index into the reference table.
///
/// Two values are reserved as sentinels and are never assigned to a live
/// value: [`NULL_REF`] and [`TOMBSTONE_REF`]. Every API that accepts a
/// `Reference` documents whether it tolerates these sentinels.
pub type Reference = u32;

/// The absent handle. Never dereferenced; tolerated by [`incref`](crate::RefHeap::incref)
/// and [`decref`](crate::RefHeap::decref) as a no-op.
pub const NULL_REF: Reference = Reference::MAX;

/// Marks a logically-deleted slot inside a dictionary's key/value arrays.
///
/// Skipped by traversal and reference counting. This crate only consumes the
/// sentinel (tolerates it wherever a child handle may be `TOMBSTONE_REF`); it
/// never produces one itself, since tombstone creation is a dictionary
/// concern outside this core's scope.
pub const TOMBSTONE_REF: Reference = Reference::MAX - 1;

/// Returns `true` if `r` is one of the two reserved sentinel values.
#[inline]
pub const fn is_sentinel(r: Reference) -> bool {
    r == NULL_REF || r == TOMBSTONE_REF
}
