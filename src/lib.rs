//! A managed heap core: a fixed-size pool whose live values are addressed
//! indirectly through a reference table, collected by a hybrid
//! reference-counting + stop-and-copy garbage collector.
//!
//! This crate is the hard part of a small interpreter's memory management:
//! it combines a bump/free-list allocator over a split heap
//! ([`pool`]/[`Pool`]), stable external handles across relocation
//! ([`Reference`]/[`RefTable`]), reference counting with recursive
//! decrement over composite values ([`RefHeap::incref`]/[`RefHeap::decref`]),
//! and a copying collector that moves values, rewrites handles, and
//! scavenges the cyclic garbage reference counting alone cannot reach
//! ([`RefHeap::collect_garbage`]).
//!
//! # Usage
//! ```
//! use refheap::{HeapConfig, RefHeap};
//!
//! let mut heap = RefHeap::init_refs(HeapConfig::new(4096));
//!
//! let a = heap.make_int(1);
//! let b = heap.make_int(2);
//! let array = heap.make_ref_array(2);
//! heap.array_set(array, 0, a);
//! heap.array_set(array, 1, b);
//! let list = heap.make_list(array);
//!
//! assert_eq!(heap.refs_used(), 4);
//! heap.decref(list);
//! assert_eq!(heap.refs_used(), 0);
//! assert_eq!(heap.mem_used(), 0);
//! ```
//!
//! What this crate does *not* do: run concurrently, collect incrementally
//! or generationally, compact the from-space between collections, support
//! weak references or finalizers beyond recursive child decrement, or
//! resize the underlying byte pool after [`RefHeap::init_refs`].

mod collector;
mod config;
mod error;
mod heap;
mod pool;
mod reference;
mod table;
mod value;

pub use collector::{RootSet, VecRootSet};
pub use config::{HeapConfig, INITIAL_SIZE};
pub use error::RefTableError;
pub use heap::RefHeap;
pub use pool::Pool;
pub use reference::{is_sentinel, Reference, NULL_REF, TOMBSTONE_REF};
pub use value::{round_up, ValueHeader, ValueType, ALIGNMENT, HEADER_SIZE, REF_SIZE};
