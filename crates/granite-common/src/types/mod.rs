//! Core type definitions for GraniteDB.

mod ids;

pub use ids::{PageId, Rid, TableId, TxnId};
