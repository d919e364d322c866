//! B+ tree errors.

use granite_common::types::PageId;
use thiserror::Error;

use crate::buffer::BufferError;

/// Result type for B+ tree operations.
pub type BTreeResult<T> = Result<T, BTreeError>;

/// Errors that can occur during B+ tree operations.
#[derive(Debug, Error)]
pub enum BTreeError {
    /// Insert of a key that already exists; all keys are unique.
    #[error("key already exists in the index")]
    DuplicateKey,

    /// Cursor construction on an empty tree.
    #[error("the tree is empty")]
    EmptyTree,

    /// A page did not contain a well-formed tree node.
    #[error("page {page_id} is not a valid tree node")]
    Corrupted {
        /// The malformed page.
        page_id: PageId,
    },

    /// Buffer pool failure underneath the tree.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
}
