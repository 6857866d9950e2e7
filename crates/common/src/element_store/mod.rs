//! Persistence seam for bucket tables
//!
//! A bucket keeps its element table, hash index, version map, children
//! adjacency, history log, key slots and scalars behind [`ElementStore`].
//! The bucket stages every write of a call and hands the store a single
//! [`ChangeSet`]; a store only has to make that one write atomic.

mod memory;
mod provider;

pub use memory::{MemoryElementStore, MemoryElementStoreError};
pub use provider::{ChangeSet, ElementStore, ElementStoreError};
