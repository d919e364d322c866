//! # granite-txn
//!
//! Transaction machinery for GraniteDB:
//!
//! - **Manager**: transaction lifecycle (begin, commit, abort) and the
//!   per-transaction lock bookkeeping consulted by the lock manager.
//! - **Lock**: a hierarchical (table/row) lock manager with five lock modes,
//!   FIFO wait queues, conditional upgrades, and compatibility-driven grant.
//! - **Deadlock**: waits-for graph construction, cycle detection, and a
//!   background detector that aborts the youngest transaction of each cycle.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Transaction lifecycle management.
pub mod manager;

/// Hierarchical lock manager.
pub mod lock;

/// Deadlock detection.
pub mod deadlock;

// Re-export commonly used types
pub use deadlock::{DeadlockDetector, WaitsForGraph};
pub use lock::{AbortReason, LockManager, LockMode, LockRequest, LockStats, TransactionAbort};
pub use manager::{IsolationLevel, Transaction, TransactionManager, TransactionState};
