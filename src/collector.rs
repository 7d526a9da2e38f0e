//! Root enumeration: the host's side of a collection.
//!
//! The core only consumes a root set; it never decides what counts as a
//! root. A host evaluator supplies one by implementing [`RootSet`] over
//! whatever holds its globals and evaluation stack.

use crate::reference::Reference;

/// Enumerates the handles a host considers reachable from outside the heap.
pub trait RootSet {
    /// Calls `visitor(name, handle)` for every root handle. `name` is
    /// informational only (typically a global's identifier) and is not
    /// interpreted by the collector.
    fn foreach_global(&self, visitor: impl FnMut(&str, Reference));
}

/// A simple named-root-list [`RootSet`], convenient for tests and small
/// embedders that don't otherwise need a dedicated globals table.
#[derive(Debug, Default, Clone)]
pub struct VecRootSet(pub Vec<(String, Reference)>);

impl VecRootSet {
    /// An empty root set.
    pub fn new() -> Self {
        VecRootSet(Vec::new())
    }

    /// Adds a named root handle.
    pub fn push(&mut self, name: impl Into<String>, handle: Reference) {
        self.0.push((name.into(), handle));
    }
}

impl RootSet for VecRootSet {
    fn foreach_global(&self, mut visitor: impl FnMut(&str, Reference)) {
        for (name, handle) in &self.0 {
            visitor(name, *handle);
        }
    }
}

impl<const N: usize> From<[Reference; N]> for VecRootSet {
    fn from(handles: [Reference; N]) -> Self {
        VecRootSet(
            handles
                .into_iter()
                .enumerate()
                .map(|(i, h)| (format!("root{i}"), h))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_root_set_visits_every_pushed_root() {
        let mut roots = VecRootSet::new();
        roots.push("a", 0);
        roots.push("b", 1);

        let mut seen = Vec::new();
        roots.foreach_global(|name, r| seen.push((name.to_string(), r)));
        assert_eq!(seen, vec![("a".to_string(), 0), ("b".to_string(), 1)]);
    }
}
