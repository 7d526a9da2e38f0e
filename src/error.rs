//! Error types for the heap's handle API.
//!
//! Allocator exhaustion is not modeled as an error: [`RefHeap::make_ref`]
//! returns [`NULL_REF`](crate::NULL_REF) on exhaustion, per the historical
//! contract this crate reimplements, and the caller is expected to run a
//! collection and retry. Reference-table growth failure, by contrast, is
//! unrecoverable and is represented here so the fatal path can still be
//! logged with context before the crate terminates.

/// Failure conditions that abort the heap rather than returning to the
/// caller for retry.
#[derive(Debug, thiserror::Error)]
pub enum RefTableError {
    /// The reference table could not grow to accommodate a new handle.
    ///
    /// Without a slot for a new handle no further allocation can make
    /// progress, so this is treated as fatal rather than recoverable.
    #[error("reference table could not be grown past {attempted_capacity} entries")]
    TableGrowthFailed {
        /// The capacity the table attempted to grow to.
        attempted_capacity: usize,
    },
}
