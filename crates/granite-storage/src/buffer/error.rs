//! Buffer pool errors.

use granite_common::types::PageId;
use thiserror::Error;

use crate::file::DiskError;

use super::frame::FrameId;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Every frame is pinned; no victim could be found. A normal outcome
    /// under pin pressure; callers retry after releasing pins.
    #[error("buffer pool exhausted, all frames are pinned")]
    PoolExhausted,

    /// Operation on a page id that is not resident in the pool.
    #[error("page {page_id} not found in buffer pool")]
    PageNotFound {
        /// The missing page id.
        page_id: PageId,
    },

    /// The page is pinned and cannot be deleted.
    #[error("page {page_id} is pinned")]
    PagePinned {
        /// The pinned page id.
        page_id: PageId,
    },

    /// Replacer operation on a frame it has never seen.
    #[error("frame {frame_id:?} is not tracked by the replacer")]
    UnknownFrame {
        /// The unknown frame id.
        frame_id: FrameId,
    },

    /// Replacer removal of a frame that is not evictable.
    #[error("frame {frame_id:?} is not evictable")]
    FrameNotEvictable {
        /// The offending frame id.
        frame_id: FrameId,
    },

    /// Disk I/O failed underneath the pool.
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
}

impl BufferError {
    /// Returns true if this is a transient error that can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(BufferError::PoolExhausted.is_retryable());
        assert!(!BufferError::PageNotFound {
            page_id: PageId::new(1)
        }
        .is_retryable());
    }
}
