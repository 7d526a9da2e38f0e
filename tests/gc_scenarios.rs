//! End-to-end garbage collection scenarios, covering the acyclic
//! reference-counting path, cyclic garbage the collector alone can reclaim,
//! and handle-identity stability across a collection.

use proptest::prelude::*;
use refheap::{HeapConfig, RefHeap, Reference, VecRootSet, NULL_REF};
use std::sync::Once;

static LOG_INIT: Once = Once::new();

fn init_tracing() {
    LOG_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn heap(memory_size: usize) -> RefHeap {
    init_tracing();
    RefHeap::init_refs(HeapConfig::new(memory_size))
}

#[test]
fn acyclic_list_is_fully_reclaimed_by_decref() {
    let mut h = heap(4096);
    let e1 = h.make_int(1);
    let e2 = h.make_int(2);
    let e3 = h.make_int(3);
    let array = h.make_ref_array(3);
    h.array_set(array, 0, e1);
    h.array_set(array, 1, e2);
    h.array_set(array, 2, e3);
    let list = h.make_list(array);

    assert_eq!(h.refs_used(), 5, "list + array + 3 ints");

    h.decref(list);
    assert_eq!(h.refs_used(), 0, "decref of the list's only handle reclaims the whole tree");
    assert_eq!(h.mem_used(), 0);
}

#[test]
fn cycle_without_a_root_survives_refcounting_but_not_collection() {
    let mut h = heap(4096);
    let a = h.make_ref_array(1);
    let b = h.make_ref_array(1);
    h.array_set(a, 0, b);
    h.array_set(b, 0, a);
    h.incref(b); // edge a[0] -> b
    h.incref(a); // edge b[0] -> a

    h.decref(a); // drop the external handle to a
    h.decref(b); // drop the external handle to b

    // Reference counting alone cannot free a cycle with no external root.
    assert_eq!(h.refs_used(), 2, "cycle trapped by refcounting");

    let roots = VecRootSet::new();
    h.collect_garbage(&roots);

    assert_eq!(h.refs_used(), 0, "the copying collector reclaims the cycle");
    assert_eq!(h.mem_used(), 0);
}

#[test]
fn cycle_with_a_root_survives_collection_with_rederived_counts() {
    let mut h = heap(4096);
    let a = h.make_ref_array(1);
    let b = h.make_ref_array(1);
    h.array_set(a, 0, b);
    h.array_set(b, 0, a);
    h.incref(b);
    h.incref(a);
    h.decref(a);
    h.decref(b);

    let mut roots = VecRootSet::new();
    roots.push("a", a);
    h.collect_garbage(&roots);

    assert_eq!(h.refs_used(), 2, "both cycle members survive via the root");
    assert_eq!(h.array_get(a, 0), b);
    assert_eq!(h.array_get(b, 0), a);
    // Per the evacuation algorithm (every visit that finds a value already
    // evacuated increments its count by one): `a` is reached once as the
    // root and once as `b[0]`, `b` is reached only as `a[0]`.
    assert_eq!(h.ref_count(a), 2, "root edge plus the incoming cycle edge from b[0]");
    assert_eq!(h.ref_count(b), 1, "single edge from a[0]");
}

#[test]
fn dag_evacuation_is_order_independent() {
    // Root points at both X and Y; Y also points at X.
    let mut h = heap(4096);
    let x = h.make_ref_array(1);
    let y = h.make_ref_array(1);
    h.array_set(y, 0, x);

    let mut roots = VecRootSet::new();
    roots.push("x", x);
    roots.push("y", y);
    h.collect_garbage(&roots);

    assert_eq!(h.refs_used(), 2);
    assert_eq!(h.ref_count(x), 2, "reached via the root and via y[0]");
    assert_eq!(h.ref_count(y), 1, "reached only via the root");
}

#[test]
fn handle_identity_is_preserved_across_collection() {
    let mut h = heap(4096);
    let handle = h.make_int(123);

    let mut roots = VecRootSet::new();
    roots.push("x", handle);
    h.collect_garbage(&roots);

    assert_eq!(h.int_value(handle), 123, "same handle dereferences to the same payload");
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Alloc,
    Decref,
    Collect,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Alloc),
        2 => Just(Op::Decref),
        1 => Just(Op::Collect),
    ]
}

proptest! {
    /// P4 (refs_used matches the live set) and P1 (every live handle still
    /// dereferences into the active half-space) across arbitrary
    /// interleavings of allocation, decref, and collection.
    #[test]
    fn refs_used_and_liveness_hold_across_random_operations(
        ops in prop::collection::vec(op_strategy(), 0..80),
    ) {
        init_tracing();
        let mut h = RefHeap::init_refs(HeapConfig::new(1 << 16));
        let mut live: Vec<Reference> = Vec::new();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Alloc => {
                    let r = h.make_int(i as i64);
                    if r != NULL_REF {
                        live.push(r);
                    }
                }
                Op::Decref => {
                    if !live.is_empty() {
                        let idx = i % live.len();
                        let r = live.remove(idx);
                        h.decref(r);
                    }
                }
                Op::Collect => {
                    let mut roots = VecRootSet::new();
                    for (j, r) in live.iter().enumerate() {
                        roots.push(format!("r{j}"), *r);
                    }
                    h.collect_garbage(&roots);
                }
            }

            prop_assert_eq!(h.refs_used(), live.len());
            for r in &live {
                let _ = h.type_of(*r);
            }
        }
    }
}
