//! Buffer pool: the only path to in-memory pages.
//!
//! The buffer pool brokers memory between the on-disk page file and a fixed
//! array of in-memory frames. It enforces at-most-one resident copy per page
//! id, pins pages while they are in use, and picks eviction victims with an
//! LRU-K replacement policy.

mod error;
mod frame;
mod latch;
mod pool;
mod replacer;

pub use error::{BufferError, BufferResult};
pub use frame::{Frame, FrameId};
pub use latch::{PageGuard, ReadPageGuard, WritePageGuard};
pub use pool::{BufferPoolManager, BufferPoolStats};
pub use replacer::LruKReplacer;
