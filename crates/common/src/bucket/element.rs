use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::access::AccessPolicy;
use crate::crypto::PublicKey;
use crate::element_store::ElementStore;

use super::batch::UpdateBatch;
use super::directory::Bucket;
use super::error::BucketError;
use super::types::{
    ContentHash, ContentType, ElementId, ElementKind, HashTriple, RedundancyLevel,
};

/// One versioned record in a bucket's element table.
///
/// Records are never deleted. Whether a record is current, superseded or
/// removed is decided by the bucket's version map, see [`ElementStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    id: ElementId,
    kind: ElementKind,
    hash: ContentHash,
    /// The triple this record currently belongs to. Refreshed when a sibling
    ///  is replaced while this record is carried over unchanged.
    triple: HashTriple,
    content_type: ContentType,
    creator: PublicKey,
    parent: Option<ElementId>,
    previous: Option<ElementId>,
    /// Points at `id` itself until a successor exists
    next: ElementId,
    holders: BTreeSet<PublicKey>,
    redundancy: RedundancyLevel,
    min_redundancy: RedundancyLevel,
    created_at: u64,
}

impl ElementRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ElementId,
        kind: ElementKind,
        triple: HashTriple,
        content_type: ContentType,
        creator: PublicKey,
        parent: Option<ElementId>,
        min_redundancy: RedundancyLevel,
        created_at: u64,
    ) -> Self {
        let mut holders = BTreeSet::new();
        holders.insert(creator);
        Self {
            id,
            kind,
            hash: triple.get(kind).clone(),
            triple,
            content_type,
            creator,
            parent,
            previous: None,
            next: id,
            holders,
            redundancy: min_redundancy,
            min_redundancy,
            created_at,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    pub fn triple(&self) -> &HashTriple {
        &self.triple
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn creator(&self) -> &PublicKey {
        &self.creator
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn previous(&self) -> Option<ElementId> {
        self.previous
    }

    pub fn next(&self) -> ElementId {
        self.next
    }

    /// Whether no successor version has been allocated
    pub fn is_terminal(&self) -> bool {
        self.next == self.id
    }

    pub fn is_container(&self) -> bool {
        self.kind == ElementKind::Container
    }

    pub fn holders(&self) -> &BTreeSet<PublicKey> {
        &self.holders
    }

    pub fn holders_count(&self) -> usize {
        self.holders.len()
    }

    pub fn redundancy(&self) -> RedundancyLevel {
        self.redundancy
    }

    pub fn min_redundancy(&self) -> RedundancyLevel {
        self.min_redundancy
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Fewer holders have announced a replica than the redundancy target asks for
    pub fn is_under_replicated(&self) -> bool {
        self.holders.len() < self.redundancy.0 as usize
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ElementId>) {
        self.parent = parent;
    }

    pub(crate) fn set_previous(&mut self, previous: ElementId) {
        self.previous = Some(previous);
    }

    pub(crate) fn set_next(&mut self, next: ElementId) {
        self.next = next;
    }

    pub(crate) fn set_triple(&mut self, triple: HashTriple) {
        self.triple = triple;
    }

    pub(crate) fn set_redundancy(&mut self, level: RedundancyLevel) {
        self.redundancy = level;
    }

    /// Returns false if `holder` was already present
    pub(crate) fn add_holder(&mut self, holder: PublicKey) -> bool {
        self.holders.insert(holder)
    }

    /// Returns false if `holder` was not present
    pub(crate) fn remove_holder(&mut self, holder: &PublicKey) -> bool {
        self.holders.remove(holder)
    }
}

/// Where a record stands in its version chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementStatus {
    Live,
    Superseded(ContentHash),
    Removed,
}

impl ElementStatus {
    pub(crate) fn from_successor(successor: Option<ContentHash>) -> Self {
        match successor {
            None => ElementStatus::Live,
            Some(hash) if hash.is_zero() => ElementStatus::Removed,
            Some(hash) => ElementStatus::Superseded(hash),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ElementStatus::Live)
    }
}

/// Capability an element holds to its owning bucket.
///
/// Handles are only handed out for registered records, and every call made
/// through one is checked against the element table again, so a stale or
/// forged id is rejected with [`BucketError::UnregisteredElement`].
pub struct ElementHandle<S: ElementStore, P: AccessPolicy> {
    bucket: Bucket<S, P>,
    id: ElementId,
}

impl<S: ElementStore, P: AccessPolicy> Clone for ElementHandle<S, P> {
    fn clone(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            id: self.id,
        }
    }
}

impl<S: ElementStore, P: AccessPolicy> std::fmt::Debug for ElementHandle<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("bucket", &self.bucket.id())
            .field("id", &self.id)
            .finish()
    }
}

impl<S: ElementStore, P: AccessPolicy> ElementHandle<S, P> {
    pub(crate) fn new(bucket: Bucket<S, P>, id: ElementId) -> Self {
        Self { bucket, id }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub async fn record(&self) -> Result<ElementRecord, BucketError> {
        self.bucket
            .element(self.id)
            .await?
            .ok_or(BucketError::UnregisteredElement(self.id))
    }

    pub async fn status(&self) -> Result<ElementStatus, BucketError> {
        self.bucket.status(self.id).await
    }

    /// Replace the triple this record currently belongs to.
    ///
    /// Returns the ids allocated for the changed hashes.
    pub async fn update(
        &self,
        sender: &PublicKey,
        new: HashTriple,
        parent: Option<ElementId>,
    ) -> Result<Vec<ElementId>, BucketError> {
        let record = self.record().await?;
        let batch = UpdateBatch::single(record.triple, new, parent, record.content_type);
        self.bucket.update_elements(sender, batch).await
    }

    pub async fn remove(&self, sender: &PublicKey) -> Result<(), BucketError> {
        self.bucket.remove_element(sender, self.id).await
    }

    pub async fn set_parent(
        &self,
        sender: &PublicKey,
        parent: Option<ElementId>,
    ) -> Result<(), BucketError> {
        self.bucket.set_element_parent(sender, self.id, parent).await
    }

    pub async fn announce_holding(&self, sender: &PublicKey) -> Result<(), BucketError> {
        self.bucket.announce_holding(sender, self.id).await
    }

    pub async fn announce_removal(&self, sender: &PublicKey) -> Result<(), BucketError> {
        self.bucket.announce_removal(sender, self.id).await
    }

    pub async fn set_redundancy_level(
        &self,
        sender: &PublicKey,
        level: RedundancyLevel,
    ) -> Result<(), BucketError> {
        self.bucket
            .set_redundancy_level(sender, self.id, level)
            .await
    }

    pub async fn request_data(&self, sender: &PublicKey) -> Result<(), BucketError> {
        self.bucket.request_data(sender, self.id).await
    }
}
