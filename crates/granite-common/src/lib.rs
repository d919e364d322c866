//! # granite-common
//!
//! Common types and constants for GraniteDB.
//!
//! This crate provides the foundational types shared by every GraniteDB
//! component:
//!
//! - **Types**: core identifiers (`PageId`, `TxnId`, `TableId`, `Rid`)
//! - **Constants**: page geometry and system-wide defaults
//!
//! ## Example
//!
//! ```rust
//! use granite_common::types::{PageId, Rid, TxnId};
//!
//! let page_id = PageId::new(42);
//! let rid = Rid::new(page_id, 7);
//! let txn_id = TxnId::new(1);
//! assert!(txn_id.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use types::{PageId, Rid, TableId, TxnId};
