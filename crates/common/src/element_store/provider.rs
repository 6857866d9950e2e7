use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bucket::{BucketMeta, ContentHash, ElementId, ElementRecord, HistoryEntry};
use crate::crypto::{KeyHash, PublicKey};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ElementStoreError<T> {
    #[error("unhandled element store provider error: {0}")]
    Provider(#[from] T),
    #[error("bucket {0} not found")]
    BucketNotFound(Uuid),
    /// A change set does not line up with the current tables,
    ///  e.g. appended ids leave a gap or a hash is assigned twice
    #[error("conflict with current store state: {0}")]
    Conflict(String),
    /// A key slot that is already filled was written again --
    ///  account, epoch
    #[error("key slot already filled: {0}, {1}")]
    KeySlotTaken(PublicKey, u64),
}

/// Every write produced by one bucket call.
///
/// Element ids at or past the current element count are appends and must be
/// contiguous; lower ids are replacements of existing records. Children lists
/// are written whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub meta: Option<BucketMeta>,
    pub elements: BTreeMap<ElementId, ElementRecord>,
    pub hashes: BTreeMap<ContentHash, ElementId>,
    pub versions: BTreeMap<ContentHash, ContentHash>,
    pub children: BTreeMap<ElementId, Vec<ElementId>>,
    pub history: Vec<HistoryEntry>,
    pub keys: Vec<(PublicKey, u64, KeyHash)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.meta.is_none()
            && self.elements.is_empty()
            && self.hashes.is_empty()
            && self.versions.is_empty()
            && self.children.is_empty()
            && self.history.is_empty()
            && self.keys.is_empty()
    }
}

/// Persistence for bucket tables.
///
/// Reads see only committed state. `apply` must commit a whole [`ChangeSet`]
/// or nothing.
#[async_trait]
pub trait ElementStore: Send + Sync + std::fmt::Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    /// The lock every writer of bucket `id` holds from its first read to its
    /// `apply`. All handles over the same store must get the same mutex.
    fn write_lock(&self, id: Uuid) -> Arc<Mutex<()>>;

    /// Bucket scalars, `None` if the bucket was never created
    async fn bucket(&self, id: Uuid) -> Result<Option<BucketMeta>, ElementStoreError<Self::Error>>;

    async fn element_count(&self, id: Uuid) -> Result<u64, ElementStoreError<Self::Error>>;

    async fn element(
        &self,
        id: Uuid,
        element: ElementId,
    ) -> Result<Option<ElementRecord>, ElementStoreError<Self::Error>>;

    /// Records in creation order starting at `start`
    async fn elements(
        &self,
        id: Uuid,
        start: u64,
        limit: usize,
    ) -> Result<Vec<ElementRecord>, ElementStoreError<Self::Error>>;

    /// The element a hash was assigned to, if it was ever assigned
    async fn resolve(
        &self,
        id: Uuid,
        hash: &ContentHash,
    ) -> Result<Option<ElementId>, ElementStoreError<Self::Error>>;

    /// Version map lookup: the replacement of `hash`, or the zero hash if removed
    async fn successor(
        &self,
        id: Uuid,
        hash: &ContentHash,
    ) -> Result<Option<ContentHash>, ElementStoreError<Self::Error>>;

    /// Children of a container in insertion order
    async fn children(
        &self,
        id: Uuid,
        parent: ElementId,
    ) -> Result<Vec<ElementId>, ElementStoreError<Self::Error>>;

    async fn history_len(&self, id: Uuid) -> Result<u64, ElementStoreError<Self::Error>>;

    async fn history(
        &self,
        id: Uuid,
        start: u64,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, ElementStoreError<Self::Error>>;

    async fn key(
        &self,
        id: Uuid,
        account: &PublicKey,
        epoch: u64,
    ) -> Result<Option<KeyHash>, ElementStoreError<Self::Error>>;

    /// Commit every write of one call.
    ///
    /// Should fail with the following errors to be considered correct:
    /// * `Err(ElementStoreError::BucketNotFound)` - the bucket does not exist and
    ///   the change set carries no bucket scalars to create it
    /// * `Err(ElementStoreError::Conflict)` - appended ids are not contiguous, or
    ///   a hash or version entry is already present
    /// * `Err(ElementStoreError::KeySlotTaken)` - a key slot is already filled
    async fn apply(&self, id: Uuid, changes: ChangeSet) -> Result<(), ElementStoreError<Self::Error>>;

    async fn hash_exists(
        &self,
        id: Uuid,
        hash: &ContentHash,
    ) -> Result<bool, ElementStoreError<Self::Error>> {
        Ok(self.resolve(id, hash).await?.is_some())
    }
}
