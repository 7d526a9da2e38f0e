//! Heap configuration.

/// Initial reference-table capacity the table grows to on first need.
///
/// Doubling thereafter is handled by [`crate::table::RefTable`]; this is
/// only the seed value, matching the historical `INITIAL_SIZE` constant.
pub const INITIAL_SIZE: usize = 16;

/// Configuration for a [`crate::RefHeap`].
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Total byte size of the backing pool, split into two equal
    /// half-spaces (each rounded down to a multiple of 8).
    pub memory_size: usize,
    /// Seed capacity for the reference table.
    pub initial_ref_table_capacity: usize,
    /// If `true`, the collector reports bytes reclaimed to stderr on every
    /// collection.
    pub interactive: bool,
}

impl HeapConfig {
    /// Creates a configuration for a pool of `memory_size` bytes, with the
    /// default initial table capacity and `interactive` off.
    pub fn new(memory_size: usize) -> Self {
        HeapConfig {
            memory_size,
            initial_ref_table_capacity: INITIAL_SIZE,
            interactive: false,
        }
    }

    /// Sets whether the collector reports bytes reclaimed to stderr.
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Overrides the reference table's initial capacity.
    pub fn with_initial_ref_table_capacity(mut self, capacity: usize) -> Self {
        self.initial_ref_table_capacity = capacity;
        self
    }
}
