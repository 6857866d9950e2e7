use std::collections::BTreeMap;

use uuid::Uuid;

use crate::crypto::{KeyHash, PublicKey};
use crate::element_store::{ChangeSet, ElementStore};

use super::element::{ElementRecord, ElementStatus};
use super::error::BucketError;
use super::types::{BucketMeta, ContentHash, ElementId, HistoryEntry};

/// Staged writes of one bucket call layered over committed store state.
///
/// Reads consult the staged writes first, so later steps of a batch observe
/// earlier ones. Nothing reaches the store until the bucket hands the result
/// of [`Txn::into_changes`] to [`ElementStore::apply`]; dropping a `Txn`
/// discards the call.
pub(crate) struct Txn<'a, S: ElementStore> {
    store: &'a S,
    bucket: Uuid,
    meta: BucketMeta,
    meta_dirty: bool,
    base_count: u64,
    elements: BTreeMap<ElementId, ElementRecord>,
    hashes: BTreeMap<ContentHash, ElementId>,
    versions: BTreeMap<ContentHash, ContentHash>,
    children: BTreeMap<ElementId, Vec<ElementId>>,
    history: Vec<HistoryEntry>,
    keys: BTreeMap<(PublicKey, u64), KeyHash>,
    appended: u64,
}

impl<'a, S: ElementStore> Txn<'a, S> {
    pub async fn begin(store: &'a S, bucket: Uuid) -> Result<Self, BucketError> {
        let meta = store
            .bucket(bucket)
            .await?
            .ok_or(BucketError::BucketNotFound(bucket))?;
        let base_count = store.element_count(bucket).await?;
        Ok(Self {
            store,
            bucket,
            meta,
            meta_dirty: false,
            base_count,
            elements: BTreeMap::new(),
            hashes: BTreeMap::new(),
            versions: BTreeMap::new(),
            children: BTreeMap::new(),
            history: Vec::new(),
            keys: BTreeMap::new(),
            appended: 0,
        })
    }

    pub fn meta(&self) -> &BucketMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut BucketMeta {
        self.meta_dirty = true;
        &mut self.meta
    }

    pub async fn element(&self, id: ElementId) -> Result<Option<ElementRecord>, BucketError> {
        if let Some(record) = self.elements.get(&id) {
            return Ok(Some(record.clone()));
        }
        Ok(self.store.element(self.bucket, id).await?)
    }

    pub async fn resolve(&self, hash: &ContentHash) -> Result<Option<ElementId>, BucketError> {
        if let Some(id) = self.hashes.get(hash) {
            return Ok(Some(*id));
        }
        Ok(self.store.resolve(self.bucket, hash).await?)
    }

    pub async fn successor(&self, hash: &ContentHash) -> Result<Option<ContentHash>, BucketError> {
        if let Some(next) = self.versions.get(hash) {
            return Ok(Some(next.clone()));
        }
        Ok(self.store.successor(self.bucket, hash).await?)
    }

    pub async fn status(&self, record: &ElementRecord) -> Result<ElementStatus, BucketError> {
        Ok(ElementStatus::from_successor(
            self.successor(record.hash()).await?,
        ))
    }

    pub async fn children(&self, parent: ElementId) -> Result<Vec<ElementId>, BucketError> {
        if let Some(children) = self.children.get(&parent) {
            return Ok(children.clone());
        }
        Ok(self.store.children(self.bucket, parent).await?)
    }

    /// Children of `parent` that still point back at it and are live
    pub async fn live_children(&self, parent: ElementId) -> Result<Vec<ElementRecord>, BucketError> {
        let mut live = Vec::new();
        for child in self.children(parent).await? {
            let Some(record) = self.element(child).await? else {
                continue;
            };
            if record.parent() == Some(parent) && self.status(&record).await?.is_live() {
                live.push(record);
            }
        }
        Ok(live)
    }

    pub async fn key(&self, account: &PublicKey, epoch: u64) -> Result<Option<KeyHash>, BucketError> {
        if let Some(key) = self.keys.get(&(*account, epoch)) {
            return Ok(Some(key.clone()));
        }
        Ok(self.store.key(self.bucket, account, epoch).await?)
    }

    /// Element count including records appended by this call
    pub fn element_count(&self) -> u64 {
        self.base_count + self.appended
    }

    /// Reserve the next element id
    pub fn allocate_id(&mut self) -> ElementId {
        let id = ElementId(self.base_count + self.appended);
        self.appended += 1;
        id
    }

    pub fn put(&mut self, record: ElementRecord) {
        self.elements.insert(record.id(), record);
    }

    pub fn assign_hash(&mut self, hash: ContentHash, id: ElementId) {
        self.hashes.insert(hash, id);
    }

    pub fn set_successor(&mut self, hash: ContentHash, next: ContentHash) {
        self.versions.insert(hash, next);
    }

    pub async fn add_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), BucketError> {
        let mut children = self.children(parent).await?;
        if !children.contains(&child) {
            children.push(child);
        }
        self.children.insert(parent, children);
        Ok(())
    }

    pub async fn remove_child(
        &mut self,
        parent: ElementId,
        child: ElementId,
    ) -> Result<(), BucketError> {
        let mut children = self.children(parent).await?;
        children.retain(|id| *id != child);
        self.children.insert(parent, children);
        Ok(())
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        tracing::debug!(
            element = %entry.element,
            operation = %entry.operation,
            "staged history entry"
        );
        self.history.push(entry);
    }

    pub fn set_key(&mut self, account: PublicKey, epoch: u64, key: KeyHash) {
        self.keys.insert((account, epoch), key);
    }

    pub fn into_changes(self) -> ChangeSet {
        ChangeSet {
            meta: self.meta_dirty.then_some(self.meta),
            elements: self.elements,
            hashes: self.hashes,
            versions: self.versions,
            children: self.children,
            history: self.history,
            keys: self
                .keys
                .into_iter()
                .map(|((account, epoch), key)| (account, epoch, key))
                .collect(),
        }
    }
}
