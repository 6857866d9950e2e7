/**
 * Admission control: roles, rate limits and
 *  the block clock, consumed through narrow traits.
 */
pub mod access;
/**
 * The bucket directory: element records, their
 *  version chains, parent/child indices, history
 *  and the key-epoch table.
 */
pub mod bucket;
/**
 * Cryptographic types.
 *  - Participant identity keys
 *  - Key commitments
 */
pub mod crypto;
/**
 * Storage seam for bucket tables, with an
 *  in-memory implementation.
 */
pub mod element_store;

pub mod prelude {
    pub use crate::access::{
        AccessError, AccessPolicy, Action, BlockClock, ManualClock, RateLimitedAccessGate, Role,
        Unrestricted,
    };
    pub use crate::bucket::{
        Bucket, BucketBuilder, BucketConfig, BucketError, BucketEvent, ContentHash, ContentType,
        CreateBatch, ElementHandle, ElementId, ElementKind, ElementRecord, HashTriple,
        HistoryEntry, Operation, RedundancyLevel, RemoveBatch, UpdateBatch,
    };
    pub use crate::crypto::{KeyHash, PublicKey, SecretKey};
    pub use crate::element_store::{ElementStore, MemoryElementStore};
}
