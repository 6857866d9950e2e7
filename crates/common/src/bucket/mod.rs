//! Versioned content directory
//!
//! A bucket is an append-only table of [`ElementRecord`]s plus the indices
//! that keep it consistent:
//!
//! - **hash index**: every [`ContentHash`] ever assigned, never reused
//! - **version map**: superseded hash -> replacement, or the zero hash once removed
//! - **children**: container -> records whose parent it is, in insertion order
//! - **history**: one [`HistoryEntry`] per create, update, re-parent and delete
//! - **key epochs**: one [`KeyHash`](crate::crypto::KeyHash) per participant and
//!   block-height window, see [`KeyEpochs`]
//!
//! Records are created and replaced in (meta, data, container) triples through
//! [`Bucket`]'s batch calls; single records are driven through an
//! [`ElementHandle`].

mod batch;
mod config;
mod directory;
mod element;
mod error;
mod events;
mod keys;
mod txn;
mod types;

pub use batch::{CreateBatch, RemoveBatch, UpdateBatch};
pub use config::{BucketConfig, ConfigError};
pub use directory::{Bucket, BucketBuilder};
pub use element::{ElementHandle, ElementRecord, ElementStatus};
pub use error::{BatchArray, BucketError};
pub use events::BucketEvent;
pub use keys::KeyEpochs;
pub use types::{
    BucketMeta, ContentHash, ContentType, ElementId, ElementKind, HashTriple, HistoryEntry,
    Operation, RedundancyLevel,
};
