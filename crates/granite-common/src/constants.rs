//! System-wide constants for GraniteDB.

use std::time::Duration;

// =============================================================================
// Page and Memory Constants
// =============================================================================

/// Page size in bytes (4 KB).
///
/// Every page on disk and every buffer pool frame is exactly this size.
pub const PAGE_SIZE: usize = 4 * 1024;

// =============================================================================
// Buffer Pool Constants
// =============================================================================

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Default K for the LRU-K replacement policy.
pub const DEFAULT_REPLACER_K: usize = 2;

// =============================================================================
// Transaction Constants
// =============================================================================

/// Default interval between deadlock detection passes.
pub const DEADLOCK_DETECTION_INTERVAL: Duration = Duration::from_millis(50);
