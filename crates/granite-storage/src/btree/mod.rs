//! B+ tree index over buffer-pool pages.
//!
//! The tree serves point lookups, insertions, deletions, and forward range
//! scans. Concurrency uses latch crabbing: traversals acquire page latches
//! from the root down and release ancestors as soon as the current node is
//! provably safe for the operation. The header page stores the root page id
//! and is latched exclusively by any operation that may change it.

mod cursor;
mod error;
mod node;
mod tree;

pub use cursor::TreeCursor;
pub use error::{BTreeError, BTreeResult};
pub use node::NodeType;
pub use tree::{BTreeConfig, BPlusTree, KeyComparator, LexicographicComparator};
