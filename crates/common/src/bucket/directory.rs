use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, OwnedMutexGuard};
use uuid::Uuid;

use crate::access::{AccessPolicy, Action, BlockClock};
use crate::crypto::{KeyHash, PublicKey};
use crate::element_store::{ChangeSet, ElementStore};

use super::batch::{CreateBatch, RemoveBatch, UpdateBatch};
use super::config::BucketConfig;
use super::element::{ElementHandle, ElementRecord, ElementStatus};
use super::error::BucketError;
use super::events::BucketEvent;
use super::keys::KeyEpochs;
use super::txn::Txn;
use super::types::{
    BucketMeta, ContentHash, ElementId, ElementKind, HistoryEntry, Operation,
    RedundancyLevel,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const PAGE_SIZE: usize = 256;

pub struct BucketBuilder<S: ElementStore, P: AccessPolicy> {
    id: Uuid,
    store: S,
    policy: P,
    clock: Arc<dyn BlockClock>,
    config: BucketConfig,
}

impl<S: ElementStore, P: AccessPolicy> BucketBuilder<S, P> {
    pub fn new(id: Uuid, store: S, policy: P, clock: Arc<dyn BlockClock>) -> Self {
        Self {
            id,
            store,
            policy,
            clock,
            config: BucketConfig::default(),
        }
    }

    pub fn config(mut self, config: BucketConfig) -> Self {
        self.config = config;
        self
    }

    /// Create a fresh bucket whose genesis is the clock's current height.
    ///
    /// `account` is the bucket's own payment account.
    pub async fn create(self, account: PublicKey) -> Result<Bucket<S, P>, BucketError> {
        self.config.validate()?;
        if self.store.bucket(self.id).await?.is_some() {
            return Err(BucketError::BucketExists(self.id));
        }

        let meta = BucketMeta {
            account,
            genesis: self.clock.height(),
            epoch_size: self.config.epoch_size,
            min_element_redundancy: self.config.min_element_redundancy,
            closed: false,
        };
        let genesis = meta.genesis;
        self.store
            .apply(
                self.id,
                ChangeSet {
                    meta: Some(meta),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(bucket = %self.id, genesis, "created bucket");
        Ok(self.build())
    }

    /// Attach to a bucket that already exists in the store
    pub async fn open(self) -> Result<Bucket<S, P>, BucketError> {
        self.config.validate()?;
        if self.store.bucket(self.id).await?.is_none() {
            return Err(BucketError::BucketNotFound(self.id));
        }
        Ok(self.build())
    }

    fn build(self) -> Bucket<S, P> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Bucket {
            inner: Arc::new(BucketInner {
                id: self.id,
                config: self.config,
                store: self.store,
                policy: self.policy,
                clock: self.clock,
                events,
            }),
        }
    }
}

/// A versioned content directory with its key-epoch table.
///
/// Mutating calls are serialized on the store's lock for this bucket, so every
/// handle over the same store sees one writer at a time. Each call either
/// commits every write through a single [`ElementStore::apply`] or leaves the
/// store untouched. Each call runs in the same order: closed check,
/// [`AccessPolicy::authorize`], key availability, workload and shape,
/// staging, [`AccessPolicy::charge`], commit, notifications.
pub struct Bucket<S: ElementStore, P: AccessPolicy> {
    inner: Arc<BucketInner<S, P>>,
}

struct BucketInner<S: ElementStore, P: AccessPolicy> {
    id: Uuid,
    config: BucketConfig,
    store: S,
    policy: P,
    clock: Arc<dyn BlockClock>,
    events: broadcast::Sender<BucketEvent>,
}

impl<S: ElementStore, P: AccessPolicy> Clone for Bucket<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ElementStore, P: AccessPolicy> std::fmt::Debug for Bucket<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<S: ElementStore, P: AccessPolicy> Bucket<S, P> {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &BucketConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn policy(&self) -> &P {
        &self.inner.policy
    }

    pub fn block_height(&self) -> u64 {
        self.inner.clock.height()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BucketEvent> {
        self.inner.events.subscribe()
    }

    /// Capability for a registered element
    pub async fn handle(&self, id: ElementId) -> Result<ElementHandle<S, P>, BucketError> {
        if self.element(id).await?.is_none() {
            return Err(BucketError::UnregisteredElement(id));
        }
        Ok(ElementHandle::new(self.clone(), id))
    }

    /* Batch operations */

    /// Create one meta, data and container record per triple.
    ///
    /// Returns the allocated ids, three per triple in meta, data, container
    /// order.
    pub async fn create_elements(
        &self,
        sender: &PublicKey,
        batch: CreateBatch,
    ) -> Result<Vec<ElementId>, BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::CreateElements).await?;
        let height = self.block_height();
        require_key(&txn, sender, height).await?;

        let n = batch.shape(self.inner.config.workload_ceiling)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let min = txn.meta().min_element_redundancy;
        let mut ids = Vec::with_capacity(n * 3);
        for i in 0..n {
            let triple = batch.triple(i);
            for kind in ElementKind::ORDER {
                let hash = triple.get(kind);
                if !hash.is_assignable() {
                    return Err(BucketError::InvalidHash {
                        kind,
                        hash: hash.clone(),
                    });
                }
                if txn.resolve(hash).await?.is_some() {
                    return Err(BucketError::HashExists {
                        kind,
                        hash: hash.clone(),
                    });
                }
                // reserve immediately so a repeat within the triple collides
                let id = txn.allocate_id();
                txn.assign_hash(hash.clone(), id);
                ids.push(id);
            }

            let parent = batch.parents[i];
            if let Some(parent) = parent {
                live_container(&txn, parent).await?;
            }

            let (meta_id, data_id, container_id) = (ids[i * 3], ids[i * 3 + 1], ids[i * 3 + 2]);
            for (id, kind, element_parent) in [
                (meta_id, ElementKind::Meta, Some(container_id)),
                (data_id, ElementKind::Data, Some(container_id)),
                (container_id, ElementKind::Container, parent),
            ] {
                txn.put(ElementRecord::new(
                    id,
                    kind,
                    triple.clone(),
                    batch.content_type,
                    *sender,
                    element_parent,
                    min,
                    height,
                ));
                txn.record(entry(id, Operation::Create, height, sender));
            }

            txn.add_child(container_id, meta_id).await?;
            txn.add_child(container_id, data_id).await?;
            if let Some(parent) = parent {
                txn.add_child(parent, container_id).await?;
            }
        }

        self.commit(txn, Action::CreateElements, n as u64).await?;
        Ok(ids)
    }

    /// Replace whole triples with new versions.
    ///
    /// A new hash equal to its previous hash keeps that record. Replacing a
    /// container moves its remaining live children under the successor.
    /// Returns the ids allocated for changed hashes.
    pub async fn update_elements(
        &self,
        sender: &PublicKey,
        batch: UpdateBatch,
    ) -> Result<Vec<ElementId>, BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::UpdateElements).await?;
        let height = self.block_height();
        require_key(&txn, sender, height).await?;

        let n = batch.shape(self.inner.config.workload_ceiling)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let min = txn.meta().min_element_redundancy;
        let mut allocated = Vec::new();
        for i in 0..n {
            let prev = batch.prev(i);
            let new = batch.new_triple(i);
            let parent = batch.parents[i];

            let prev_meta = resolve_previous(&txn, ElementKind::Meta, &prev.meta).await?;
            let prev_data = resolve_previous(&txn, ElementKind::Data, &prev.data).await?;
            let prev_container =
                resolve_previous(&txn, ElementKind::Container, &prev.container).await?;

            for record in [&prev_meta, &prev_data] {
                if record.parent() != Some(prev_container.id()) {
                    return Err(BucketError::NotChildOfParent {
                        kind: record.kind(),
                        hash: record.hash().clone(),
                    });
                }
            }
            if prev_container.parent() != parent {
                return Err(BucketError::NotChildOfParent {
                    kind: ElementKind::Container,
                    hash: prev_container.hash().clone(),
                });
            }
            if let Some(parent) = parent {
                live_container(&txn, parent).await?;
            }

            let new_meta = stage_successor_hash(&mut txn, &prev_meta, &new.meta).await?;
            let new_data = stage_successor_hash(&mut txn, &prev_data, &new.data).await?;
            let new_container =
                stage_successor_hash(&mut txn, &prev_container, &new.container).await?;
            if new_meta.is_none() && new_data.is_none() && new_container.is_none() {
                continue;
            }

            let container_target = new_container.unwrap_or(prev_container.id());
            let meta_target = new_meta.unwrap_or(prev_meta.id());
            let data_target = new_data.unwrap_or(prev_data.id());
            let old_container = prev_container.id();

            for (mut record, successor) in [
                (prev_meta, new_meta),
                (prev_data, new_data),
                (prev_container, new_container),
            ] {
                let Some(successor) = successor else {
                    record.set_triple(new.clone());
                    txn.put(record);
                    continue;
                };

                let kind = record.kind();
                let successor_parent = match kind {
                    ElementKind::Container => parent,
                    _ => Some(container_target),
                };
                let mut next = ElementRecord::new(
                    successor,
                    kind,
                    new.clone(),
                    batch.content_type,
                    *sender,
                    successor_parent,
                    min,
                    height,
                );
                next.set_previous(record.id());
                record.set_next(successor);
                txn.set_successor(record.hash().clone(), new.get(kind).clone());
                txn.record(entry(successor, Operation::Create, height, sender));
                txn.record(HistoryEntry {
                    previous: Some(record.id()),
                    ..entry(successor, Operation::Update, height, sender)
                });
                txn.put(record);
                txn.put(next);
                allocated.push(successor);
            }

            match new_container {
                None => {
                    for target in [new_meta, new_data].into_iter().flatten() {
                        txn.add_child(old_container, target).await?;
                    }
                }
                Some(successor) => {
                    txn.add_child(successor, meta_target).await?;
                    txn.add_child(successor, data_target).await?;
                    for mut child in txn.live_children(old_container).await? {
                        child.set_parent(Some(successor));
                        txn.remove_child(old_container, child.id()).await?;
                        txn.add_child(successor, child.id()).await?;
                        txn.record(HistoryEntry {
                            parent: Some(successor),
                            ..entry(child.id(), Operation::UpdateParent, height, sender)
                        });
                        txn.put(child);
                    }
                    if let Some(parent) = parent {
                        txn.add_child(parent, successor).await?;
                    }
                }
            }
        }

        self.commit(txn, Action::UpdateElements, n as u64).await?;
        Ok(allocated)
    }

    /// Tombstone whole triples.
    ///
    /// A container may only be removed once it has no live children beyond
    /// the meta and data removed with it in the same call.
    pub async fn remove_elements(
        &self,
        sender: &PublicKey,
        batch: RemoveBatch,
    ) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::RemoveElements).await?;
        let height = self.block_height();

        let n = batch.shape(self.inner.config.workload_ceiling)?;
        if n == 0 {
            return Ok(());
        }

        let mut containers = Vec::with_capacity(n);
        for i in 0..n {
            let triple = batch.triple(i);
            let meta = resolve_removable(&txn, ElementKind::Meta, &triple.meta).await?;
            let data = resolve_removable(&txn, ElementKind::Data, &triple.data).await?;
            let container =
                resolve_removable(&txn, ElementKind::Container, &triple.container).await?;

            for record in [&meta, &data] {
                if record.parent() != Some(container.id()) {
                    return Err(BucketError::NotChildOfParent {
                        kind: record.kind(),
                        hash: record.hash().clone(),
                    });
                }
            }

            for record in [&meta, &data, &container] {
                txn.set_successor(record.hash().clone(), ContentHash::zero());
                txn.record(entry(record.id(), Operation::Delete, height, sender));
            }
            containers.push(container);
        }

        for container in containers {
            if !txn.live_children(container.id()).await?.is_empty() {
                return Err(BucketError::HasLiveChildren(container.hash().clone()));
            }
        }

        self.commit(txn, Action::RemoveElements, n as u64).await
    }

    /* Element operations, reached through an ElementHandle */

    /// Retire a single record once it has been fully de-replicated
    pub async fn remove_element(&self, sender: &PublicKey, id: ElementId) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::RemoveElements).await?;
        let record = registered(&txn, id).await?;

        if record.redundancy() != RedundancyLevel::NONE {
            return Err(BucketError::WrongRedundancyLevel {
                element: id,
                level: record.redundancy(),
            });
        }
        match txn.status(&record).await? {
            ElementStatus::Live => {}
            ElementStatus::Removed => return Err(not_found(&record)),
            ElementStatus::Superseded(_) => {
                return Err(BucketError::NewerVersionExists {
                    kind: record.kind(),
                    hash: record.hash().clone(),
                })
            }
        }
        if record.is_container() && !txn.live_children(id).await?.is_empty() {
            return Err(BucketError::HasLiveChildren(record.hash().clone()));
        }

        let height = self.block_height();
        txn.set_successor(record.hash().clone(), ContentHash::zero());
        txn.record(entry(id, Operation::Delete, height, sender));
        self.commit(txn, Action::RemoveElements, 1).await
    }

    /// Move a record under another container, or to the root with `None`
    pub async fn set_element_parent(
        &self,
        sender: &PublicKey,
        id: ElementId,
        parent: Option<ElementId>,
    ) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::UpdateParent).await?;
        let height = self.block_height();
        require_key(&txn, sender, height).await?;
        let mut record = registered(&txn, id).await?;

        match txn.status(&record).await? {
            ElementStatus::Live => {}
            ElementStatus::Removed => return Err(not_found(&record)),
            ElementStatus::Superseded(_) => {
                return Err(BucketError::AlreadySuperseded {
                    kind: record.kind(),
                    hash: record.hash().clone(),
                })
            }
        }
        if record.parent() == parent {
            return Ok(());
        }

        if let Some(target) = parent {
            live_container(&txn, target).await?;
            // walk up from the new parent; reaching `id` would close a loop
            let mut cursor = Some(target);
            let mut steps: u64 = 0;
            while let Some(current) = cursor {
                if current == id || steps > txn.element_count() {
                    return Err(BucketError::CyclicParent {
                        element: id,
                        parent: target,
                    });
                }
                cursor = txn.element(current).await?.and_then(|r| r.parent());
                steps += 1;
            }
        }

        if let Some(old) = record.parent() {
            txn.remove_child(old, id).await?;
        }
        if let Some(target) = parent {
            txn.add_child(target, id).await?;
        }
        record.set_parent(parent);
        txn.put(record);
        txn.record(HistoryEntry {
            parent,
            ..entry(id, Operation::UpdateParent, height, sender)
        });
        self.commit(txn, Action::UpdateParent, 1).await
    }

    /// Add `sender` to the record's holders. Repeating the call is a no-op.
    pub async fn announce_holding(
        &self,
        sender: &PublicKey,
        id: ElementId,
    ) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::AnnounceHolding).await?;
        let mut record = registered(&txn, id).await?;

        if record.add_holder(*sender) {
            tracing::debug!(element = %id, holder = %sender.short(), "holder added");
            txn.put(record);
        }
        self.commit(txn, Action::AnnounceHolding, 1).await
    }

    /// Drop `sender` from the record's holders. Repeating the call is a no-op.
    pub async fn announce_removal(
        &self,
        sender: &PublicKey,
        id: ElementId,
    ) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::AnnounceRemoval).await?;
        let mut record = registered(&txn, id).await?;

        if record.remove_holder(sender) {
            tracing::debug!(element = %id, holder = %sender.short(), "holder removed");
            txn.put(record);
        }
        self.commit(txn, Action::AnnounceRemoval, 1).await
    }

    pub async fn set_redundancy_level(
        &self,
        sender: &PublicKey,
        id: ElementId,
        level: RedundancyLevel,
    ) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::SetRedundancy).await?;
        let mut record = registered(&txn, id).await?;

        if record.redundancy() != level {
            record.set_redundancy(level);
            txn.put(record);
        }
        self.commit(txn, Action::SetRedundancy, 1).await
    }

    /// Ask holders to serve the record's content. Only emits a notification.
    pub async fn request_data(&self, sender: &PublicKey, id: ElementId) -> Result<(), BucketError> {
        let txn = self.begin().await?;
        self.authorize(sender, Action::RequestData).await?;
        registered(&txn, id).await?;

        let _ = self.inner.events.send(BucketEvent::DataRequested {
            element: id,
            requestor: *sender,
            block_height: self.block_height(),
        });
        Ok(())
    }

    /* Bucket scalars */

    /// Stop accepting mutations for good
    pub async fn close(&self, sender: &PublicKey) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::Close).await?;

        txn.meta_mut().closed = true;
        self.commit(txn, Action::Close, 1).await?;
        tracing::info!(bucket = %self.inner.id, "closed bucket");
        Ok(())
    }

    /// Redundancy applied to records created from now on
    pub async fn set_min_element_redundancy(
        &self,
        sender: &PublicKey,
        level: RedundancyLevel,
    ) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::SetMinRedundancy).await?;

        txn.meta_mut().min_element_redundancy = level;
        self.commit(txn, Action::SetMinRedundancy, 1).await
    }

    /* Key epochs */

    /// Commit `key` for `participant` in the epoch containing `height`
    pub async fn set_key(
        &self,
        sender: &PublicKey,
        participant: &PublicKey,
        key: KeyHash,
        height: u64,
    ) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::SetKey).await?;
        if key.is_empty() {
            return Err(BucketError::InvalidKeyInput);
        }

        let epochs = KeyEpochs::from(txn.meta());
        let epoch = epochs.writable_epoch(height, self.block_height())?;
        if txn.key(participant, epoch).await?.is_some() {
            return Err(BucketError::KeyAlreadyAvailable {
                account: *participant,
                epoch,
            });
        }

        txn.set_key(*participant, epoch, key);
        self.commit(txn, Action::SetKey, 1).await
    }

    /// Commit one key per participant for the current epoch
    pub async fn add_keys(
        &self,
        sender: &PublicKey,
        keys: Vec<KeyHash>,
        participants: Vec<PublicKey>,
    ) -> Result<(), BucketError> {
        let _guard = self.lock().await;
        let mut txn = self.begin().await?;
        ensure_open(&txn)?;
        self.authorize(sender, Action::AddKeys).await?;
        if keys.is_empty() || keys.len() != participants.len() {
            return Err(BucketError::InvalidKeyInput);
        }

        let height = self.block_height();
        let epoch = KeyEpochs::from(txn.meta()).writable_epoch(height, height)?;
        for (key, participant) in keys.into_iter().zip(participants) {
            if key.is_empty() {
                return Err(BucketError::InvalidKeyInput);
            }
            if txn.key(&participant, epoch).await?.is_some() {
                return Err(BucketError::KeyAlreadyAvailable {
                    account: participant,
                    epoch,
                });
            }
            txn.set_key(participant, epoch, key);
        }
        self.commit(txn, Action::AddKeys, 1).await
    }

    /// The key committed for the exact epoch containing `height`
    pub async fn get_key(&self, participant: &PublicKey, height: u64) -> Result<KeyHash, BucketError> {
        let epoch = KeyEpochs::from(&self.meta().await?).epoch_of(height)?;
        self.inner
            .store
            .key(self.inner.id, participant, epoch)
            .await?
            .ok_or(BucketError::NoKeyAvailable {
                account: *participant,
                epoch,
            })
    }

    /* Reads */

    pub async fn meta(&self) -> Result<BucketMeta, BucketError> {
        self.inner
            .store
            .bucket(self.inner.id)
            .await?
            .ok_or(BucketError::BucketNotFound(self.inner.id))
    }

    pub async fn genesis(&self) -> Result<u64, BucketError> {
        Ok(self.meta().await?.genesis)
    }

    pub async fn min_element_redundancy(&self) -> Result<RedundancyLevel, BucketError> {
        Ok(self.meta().await?.min_element_redundancy)
    }

    pub async fn is_closed(&self) -> Result<bool, BucketError> {
        Ok(self.meta().await?.closed)
    }

    pub async fn element(&self, id: ElementId) -> Result<Option<ElementRecord>, BucketError> {
        Ok(self.inner.store.element(self.inner.id, id).await?)
    }

    pub async fn elements(&self, start: u64, limit: usize) -> Result<Vec<ElementRecord>, BucketError> {
        Ok(self.inner.store.elements(self.inner.id, start, limit).await?)
    }

    pub async fn element_count(&self) -> Result<u64, BucketError> {
        Ok(self.inner.store.element_count(self.inner.id).await?)
    }

    /// Whether `hash` was ever assigned, live or not
    pub async fn hash_exists(&self, hash: &ContentHash) -> Result<bool, BucketError> {
        Ok(self.inner.store.hash_exists(self.inner.id, hash).await?)
    }

    pub async fn resolve(&self, hash: &ContentHash) -> Result<Option<ElementId>, BucketError> {
        Ok(self.inner.store.resolve(self.inner.id, hash).await?)
    }

    /// Direct version map entry for `hash`
    pub async fn version_of(&self, hash: &ContentHash) -> Result<Option<ContentHash>, BucketError> {
        Ok(self.inner.store.successor(self.inner.id, hash).await?)
    }

    /// Follow the version map from `hash` to the current head, or to the
    /// zero hash if the chain ends in a removal. `None` for unknown hashes.
    pub async fn latest_version(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<ContentHash>, BucketError> {
        if !self.hash_exists(hash).await? {
            return Ok(None);
        }
        let bound = self.element_count().await?;
        let mut current = hash.clone();
        for _ in 0..=bound {
            match self.version_of(&current).await? {
                None => return Ok(Some(current)),
                Some(next) if next.is_zero() => return Ok(Some(next)),
                Some(next) => current = next,
            }
        }
        Err(BucketError::Store(anyhow::anyhow!(
            "version chain from {} does not terminate",
            hash
        )))
    }

    /// Every version map entry, in element creation order
    pub async fn version_map(&self) -> Result<BTreeMap<ContentHash, ContentHash>, BucketError> {
        let mut versions = BTreeMap::new();
        for record in self.all_elements().await? {
            if let Some(next) = self.version_of(record.hash()).await? {
                versions.insert(record.hash().clone(), next);
            }
        }
        Ok(versions)
    }

    pub async fn status(&self, id: ElementId) -> Result<ElementStatus, BucketError> {
        let record = self
            .element(id)
            .await?
            .ok_or(BucketError::UnregisteredElement(id))?;
        Ok(ElementStatus::from_successor(
            self.version_of(record.hash()).await?,
        ))
    }

    /// Children of a container in insertion order, including superseded
    /// and removed records
    pub async fn children_of(&self, id: ElementId) -> Result<Vec<ElementId>, BucketError> {
        Ok(self.inner.store.children(self.inner.id, id).await?)
    }

    pub async fn live_children(&self, id: ElementId) -> Result<Vec<ElementId>, BucketError> {
        let txn = self.begin().await?;
        Ok(txn
            .live_children(id)
            .await?
            .iter()
            .map(ElementRecord::id)
            .collect())
    }

    pub async fn history(&self, start: u64, limit: usize) -> Result<Vec<HistoryEntry>, BucketError> {
        Ok(self.inner.store.history(self.inner.id, start, limit).await?)
    }

    pub async fn history_entry(&self, index: u64) -> Result<Option<HistoryEntry>, BucketError> {
        Ok(self.history(index, 1).await?.into_iter().next())
    }

    pub async fn history_len(&self) -> Result<u64, BucketError> {
        Ok(self.inner.store.history_len(self.inner.id).await?)
    }

    /// Live records with fewer announced holders than their redundancy target
    pub async fn under_replicated(&self) -> Result<Vec<ElementId>, BucketError> {
        let mut ids = Vec::new();
        for record in self.all_elements().await? {
            if record.is_under_replicated()
                && self.version_of(record.hash()).await?.is_none()
            {
                ids.push(record.id());
            }
        }
        Ok(ids)
    }

    async fn all_elements(&self) -> Result<Vec<ElementRecord>, BucketError> {
        let mut all = Vec::new();
        loop {
            let page = self.elements(all.len() as u64, PAGE_SIZE).await?;
            let done = page.len() < PAGE_SIZE;
            all.extend(page);
            if done {
                return Ok(all);
            }
        }
    }

    /* Internals */

    async fn lock(&self) -> OwnedMutexGuard<()> {
        self.inner.store.write_lock(self.inner.id).lock_owned().await
    }

    async fn begin(&self) -> Result<Txn<'_, S>, BucketError> {
        Txn::begin(&self.inner.store, self.inner.id).await
    }

    async fn authorize(&self, sender: &PublicKey, action: Action) -> Result<(), BucketError> {
        self.inner.policy.authorize(sender, action).await?;
        Ok(())
    }

    /// Charge, write and notify. Nothing is charged for a call that staged
    /// no writes.
    async fn commit(&self, txn: Txn<'_, S>, action: Action, units: u64) -> Result<(), BucketError> {
        let changes = txn.into_changes();
        if changes.is_empty() {
            return Ok(());
        }

        self.inner.policy.charge(action, units).await?;
        let history = changes.history.clone();
        if let Err(e) = self.inner.store.apply(self.inner.id, changes).await {
            tracing::warn!(bucket = %self.inner.id, %action, "commit failed: {}", e);
            if let Err(refund) = self.inner.policy.refund(action, units).await {
                tracing::warn!(%action, units, "refund failed: {}", refund);
            }
            return Err(e.into());
        }

        tracing::info!(
            bucket = %self.inner.id,
            %action,
            units,
            entries = history.len(),
            "committed"
        );
        for entry in history {
            // no subscribers is fine
            let _ = self.inner.events.send(BucketEvent::Recorded(entry));
        }
        Ok(())
    }
}

fn entry(element: ElementId, operation: Operation, block_height: u64, sender: &PublicKey) -> HistoryEntry {
    HistoryEntry {
        element,
        operation,
        block_height,
        sender: *sender,
        previous: None,
        parent: None,
    }
}

fn ensure_open<S: ElementStore>(txn: &Txn<'_, S>) -> Result<(), BucketError> {
    if txn.meta().closed {
        return Err(BucketError::Closed);
    }
    Ok(())
}

fn not_found(record: &ElementRecord) -> BucketError {
    BucketError::NotFound {
        kind: record.kind(),
        hash: record.hash().clone(),
    }
}

async fn require_key<S: ElementStore>(
    txn: &Txn<'_, S>,
    account: &PublicKey,
    height: u64,
) -> Result<(), BucketError> {
    let epoch = KeyEpochs::from(txn.meta()).epoch_of(height)?;
    match txn.key(account, epoch).await? {
        Some(_) => Ok(()),
        None => Err(BucketError::NoKeyAvailable {
            account: *account,
            epoch,
        }),
    }
}

async fn registered<S: ElementStore>(
    txn: &Txn<'_, S>,
    id: ElementId,
) -> Result<ElementRecord, BucketError> {
    txn.element(id)
        .await?
        .ok_or(BucketError::UnregisteredElement(id))
}

async fn live_container<S: ElementStore>(
    txn: &Txn<'_, S>,
    id: ElementId,
) -> Result<ElementRecord, BucketError> {
    let record = txn
        .element(id)
        .await?
        .ok_or(BucketError::ParentNotFound(id))?;
    if !record.is_container() {
        return Err(BucketError::ParentNotContainer(id));
    }
    if !txn.status(&record).await?.is_live() {
        return Err(BucketError::ParentNotFound(id));
    }
    Ok(record)
}

/// The record `hash` was assigned to, provided it was created as `kind`
async fn lookup<S: ElementStore>(
    txn: &Txn<'_, S>,
    kind: ElementKind,
    hash: &ContentHash,
) -> Result<ElementRecord, BucketError> {
    let record = match txn.resolve(hash).await? {
        Some(id) => txn.element(id).await?,
        None => None,
    };
    record
        .filter(|record| record.kind() == kind)
        .ok_or_else(|| BucketError::NotFound {
            kind,
            hash: hash.clone(),
        })
}

async fn resolve_previous<S: ElementStore>(
    txn: &Txn<'_, S>,
    kind: ElementKind,
    hash: &ContentHash,
) -> Result<ElementRecord, BucketError> {
    let record = lookup(txn, kind, hash).await?;
    match txn.status(&record).await? {
        ElementStatus::Live => Ok(record),
        ElementStatus::Removed => Err(not_found(&record)),
        ElementStatus::Superseded(_) => Err(BucketError::AlreadySuperseded {
            kind,
            hash: hash.clone(),
        }),
    }
}

async fn resolve_removable<S: ElementStore>(
    txn: &Txn<'_, S>,
    kind: ElementKind,
    hash: &ContentHash,
) -> Result<ElementRecord, BucketError> {
    let record = lookup(txn, kind, hash).await?;
    match txn.status(&record).await? {
        ElementStatus::Live => Ok(record),
        ElementStatus::Removed => Err(not_found(&record)),
        ElementStatus::Superseded(_) => Err(BucketError::NewerVersionExists {
            kind,
            hash: hash.clone(),
        }),
    }
}

/// Validate and reserve the replacement for `prev`. `None` when the hash is
/// unchanged and the record is carried over.
async fn stage_successor_hash<S: ElementStore>(
    txn: &mut Txn<'_, S>,
    prev: &ElementRecord,
    new: &ContentHash,
) -> Result<Option<ElementId>, BucketError> {
    let kind = prev.kind();
    if new == prev.hash() {
        return Ok(None);
    }
    if !new.is_assignable() {
        return Err(BucketError::InvalidHash {
            kind,
            hash: new.clone(),
        });
    }
    if txn.successor(new).await?.is_some() {
        return Err(BucketError::CollidesWithOlderVersion {
            kind,
            hash: new.clone(),
        });
    }
    if txn.resolve(new).await?.is_some() {
        return Err(BucketError::HashExists {
            kind,
            hash: new.clone(),
        });
    }
    let id = txn.allocate_id();
    txn.assign_hash(new.clone(), id);
    Ok(Some(id))
}
