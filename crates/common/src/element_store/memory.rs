use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex as WriteLock;
use uuid::Uuid;

use super::provider::{ChangeSet, ElementStoreError, ElementStore};
use crate::bucket::{BucketMeta, ContentHash, ElementId, ElementRecord, HistoryEntry};
use crate::crypto::{KeyHash, PublicKey};

/// In-memory element store using HashMaps
#[derive(Debug, Clone)]
pub struct MemoryElementStore {
    inner: Arc<RwLock<HashMap<Uuid, BucketTables>>>,
    /// One writer lock per bucket, shared by every clone of the store
    locks: Arc<Mutex<HashMap<Uuid, Arc<WriteLock<()>>>>>,
}

#[derive(Debug)]
struct BucketTables {
    meta: BucketMeta,
    /// Append-only, indexed by element id
    elements: Vec<ElementRecord>,
    /// Every hash ever assigned -> the element it was assigned to
    hashes: HashMap<ContentHash, ElementId>,
    /// Superseded hash -> replacement, or the zero hash when removed
    versions: HashMap<ContentHash, ContentHash>,
    children: HashMap<ElementId, Vec<ElementId>>,
    history: Vec<HistoryEntry>,
    keys: HashMap<(PublicKey, u64), KeyHash>,
}

impl BucketTables {
    fn new(meta: BucketMeta) -> Self {
        Self {
            meta,
            elements: Vec::new(),
            hashes: HashMap::new(),
            versions: HashMap::new(),
            children: HashMap::new(),
            history: Vec::new(),
            keys: HashMap::new(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryElementStoreError {
    #[error("memory store error: {0}")]
    Internal(String),
}

impl MemoryElementStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ids of every bucket held by this store
    pub fn buckets(&self) -> Result<Vec<Uuid>, ElementStoreError<MemoryElementStoreError>> {
        let inner = self.inner.read().map_err(|e| {
            ElementStoreError::Provider(MemoryElementStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        Ok(inner.keys().copied().collect())
    }

    fn read<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&BucketTables) -> R,
    ) -> Result<R, ElementStoreError<MemoryElementStoreError>> {
        let inner = self.inner.read().map_err(|e| {
            ElementStoreError::Provider(MemoryElementStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        let tables = inner.get(&id).ok_or(ElementStoreError::BucketNotFound(id))?;
        Ok(f(tables))
    }
}

impl Default for MemoryElementStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject a change set that cannot be applied to `tables` as a whole
fn validate(
    tables: Option<&BucketTables>,
    changes: &ChangeSet,
) -> Result<(), ElementStoreError<MemoryElementStoreError>> {
    let count = tables.map(|t| t.elements.len() as u64).unwrap_or(0);

    let mut expected = count;
    for id in changes.elements.keys().filter(|id| id.0 >= count) {
        if id.0 != expected {
            return Err(ElementStoreError::Conflict(format!(
                "element {} appended out of order, expected #{}",
                id, expected
            )));
        }
        expected += 1;
    }

    let Some(tables) = tables else {
        return Ok(());
    };

    for hash in changes.hashes.keys() {
        if tables.hashes.contains_key(hash) {
            return Err(ElementStoreError::Conflict(format!(
                "hash {} already assigned",
                hash
            )));
        }
    }
    for hash in changes.versions.keys() {
        if tables.versions.contains_key(hash) {
            return Err(ElementStoreError::Conflict(format!(
                "hash {} already has a successor",
                hash
            )));
        }
    }
    for (account, epoch, _) in &changes.keys {
        if tables.keys.contains_key(&(*account, *epoch)) {
            return Err(ElementStoreError::KeySlotTaken(*account, *epoch));
        }
    }
    Ok(())
}

#[async_trait]
impl ElementStore for MemoryElementStore {
    type Error = MemoryElementStoreError;

    fn write_lock(&self, id: Uuid) -> Arc<WriteLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_default().clone()
    }

    async fn bucket(&self, id: Uuid) -> Result<Option<BucketMeta>, ElementStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(|e| {
            ElementStoreError::Provider(MemoryElementStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        Ok(inner.get(&id).map(|tables| tables.meta.clone()))
    }

    async fn element_count(&self, id: Uuid) -> Result<u64, ElementStoreError<Self::Error>> {
        self.read(id, |t| t.elements.len() as u64)
    }

    async fn element(
        &self,
        id: Uuid,
        element: ElementId,
    ) -> Result<Option<ElementRecord>, ElementStoreError<Self::Error>> {
        self.read(id, |t| {
            usize::try_from(element.0)
                .ok()
                .and_then(|i| t.elements.get(i))
                .cloned()
        })
    }

    async fn elements(
        &self,
        id: Uuid,
        start: u64,
        limit: usize,
    ) -> Result<Vec<ElementRecord>, ElementStoreError<Self::Error>> {
        self.read(id, |t| {
            t.elements
                .iter()
                .skip(start as usize)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    async fn resolve(
        &self,
        id: Uuid,
        hash: &ContentHash,
    ) -> Result<Option<ElementId>, ElementStoreError<Self::Error>> {
        self.read(id, |t| t.hashes.get(hash).copied())
    }

    async fn successor(
        &self,
        id: Uuid,
        hash: &ContentHash,
    ) -> Result<Option<ContentHash>, ElementStoreError<Self::Error>> {
        self.read(id, |t| t.versions.get(hash).cloned())
    }

    async fn children(
        &self,
        id: Uuid,
        parent: ElementId,
    ) -> Result<Vec<ElementId>, ElementStoreError<Self::Error>> {
        self.read(id, |t| t.children.get(&parent).cloned().unwrap_or_default())
    }

    async fn history_len(&self, id: Uuid) -> Result<u64, ElementStoreError<Self::Error>> {
        self.read(id, |t| t.history.len() as u64)
    }

    async fn history(
        &self,
        id: Uuid,
        start: u64,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, ElementStoreError<Self::Error>> {
        self.read(id, |t| {
            t.history
                .iter()
                .skip(start as usize)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    async fn key(
        &self,
        id: Uuid,
        account: &PublicKey,
        epoch: u64,
    ) -> Result<Option<KeyHash>, ElementStoreError<Self::Error>> {
        self.read(id, |t| t.keys.get(&(*account, epoch)).cloned())
    }

    async fn apply(&self, id: Uuid, changes: ChangeSet) -> Result<(), ElementStoreError<Self::Error>> {
        let mut inner = self.inner.write().map_err(|e| {
            ElementStoreError::Provider(MemoryElementStoreError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })?;

        if !inner.contains_key(&id) && changes.meta.is_none() {
            return Err(ElementStoreError::BucketNotFound(id));
        }
        validate(inner.get(&id), &changes)?;

        let ChangeSet {
            meta,
            elements,
            hashes,
            versions,
            children,
            history,
            keys,
        } = changes;

        let tables = match (inner.contains_key(&id), meta) {
            (true, Some(meta)) => {
                let tables = inner
                    .get_mut(&id)
                    .ok_or(ElementStoreError::BucketNotFound(id))?;
                tables.meta = meta;
                tables
            }
            (true, None) => inner
                .get_mut(&id)
                .ok_or(ElementStoreError::BucketNotFound(id))?,
            (false, Some(meta)) => inner.entry(id).or_insert_with(|| BucketTables::new(meta)),
            (false, None) => return Err(ElementStoreError::BucketNotFound(id)),
        };

        // Ids were checked to be replacements or a contiguous run of appends
        for (element_id, record) in elements {
            let index = element_id.0 as usize;
            if index < tables.elements.len() {
                tables.elements[index] = record;
            } else {
                tables.elements.push(record);
            }
        }
        tables.hashes.extend(hashes);
        tables.versions.extend(versions);
        tables.children.extend(children);
        tables.history.extend(history);
        tables
            .keys
            .extend(keys.into_iter().map(|(account, epoch, key)| ((account, epoch), key)));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{
        ContentType, ElementKind, HashTriple, Operation, RedundancyLevel,
    };
    use crate::crypto::SecretKey;

    fn meta() -> BucketMeta {
        BucketMeta {
            account: SecretKey::from_seed("bucket").public(),
            genesis: 10,
            epoch_size: 100,
            min_element_redundancy: RedundancyLevel(1),
            closed: false,
        }
    }

    fn record(id: u64, kind: ElementKind) -> ElementRecord {
        ElementRecord::new(
            ElementId(id),
            kind,
            HashTriple::new("m", "d", "c"),
            ContentType(0),
            SecretKey::from_seed("alice").public(),
            None,
            RedundancyLevel(1),
            10,
        )
    }

    #[tokio::test]
    async fn test_apply_requires_bucket() {
        let store = MemoryElementStore::new();
        let id = Uuid::new_v4();

        let result = store.apply(id, ChangeSet::default()).await;
        assert!(matches!(result, Err(ElementStoreError::BucketNotFound(_))));

        store
            .apply(
                id,
                ChangeSet {
                    meta: Some(meta()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.bucket(id).await.unwrap(), Some(meta()));
        assert_eq!(store.buckets().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_apply_appends_elements_and_indices() {
        let store = MemoryElementStore::new();
        let id = Uuid::new_v4();

        let mut changes = ChangeSet {
            meta: Some(meta()),
            ..Default::default()
        };
        changes.elements.insert(ElementId(0), record(0, ElementKind::Meta));
        changes.elements.insert(ElementId(1), record(1, ElementKind::Data));
        changes.hashes.insert(ContentHash::new("m"), ElementId(0));
        changes.hashes.insert(ContentHash::new("d"), ElementId(1));
        changes.history.push(HistoryEntry {
            element: ElementId(0),
            operation: Operation::Create,
            block_height: 10,
            sender: SecretKey::from_seed("alice").public(),
            previous: None,
            parent: None,
        });
        store.apply(id, changes).await.unwrap();

        assert_eq!(store.element_count(id).await.unwrap(), 2);
        assert_eq!(
            store.resolve(id, &ContentHash::new("d")).await.unwrap(),
            Some(ElementId(1))
        );
        assert!(store.hash_exists(id, &ContentHash::new("m")).await.unwrap());
        assert!(!store.hash_exists(id, &ContentHash::new("x")).await.unwrap());
        assert_eq!(store.history_len(id).await.unwrap(), 1);
        assert_eq!(store.elements(id, 1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gap_in_appended_ids_conflicts() {
        let store = MemoryElementStore::new();
        let id = Uuid::new_v4();

        let mut changes = ChangeSet {
            meta: Some(meta()),
            ..Default::default()
        };
        changes.elements.insert(ElementId(1), record(1, ElementKind::Meta));
        let result = store.apply(id, changes).await;
        assert!(matches!(result, Err(ElementStoreError::Conflict(_))));
        assert!(store.bucket(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_apply_leaves_tables_untouched() {
        let store = MemoryElementStore::new();
        let id = Uuid::new_v4();
        let alice = SecretKey::from_seed("alice").public();

        let mut changes = ChangeSet {
            meta: Some(meta()),
            ..Default::default()
        };
        changes.keys.push((alice, 0, KeyHash::new("k0")));
        store.apply(id, changes).await.unwrap();

        let mut changes = ChangeSet::default();
        changes.elements.insert(ElementId(0), record(0, ElementKind::Meta));
        changes.keys.push((alice, 0, KeyHash::new("k1")));
        let result = store.apply(id, changes).await;
        assert!(matches!(result, Err(ElementStoreError::KeySlotTaken(_, 0))));

        assert_eq!(store.element_count(id).await.unwrap(), 0);
        assert_eq!(
            store.key(id, &alice, 0).await.unwrap(),
            Some(KeyHash::new("k0"))
        );
    }

    #[tokio::test]
    async fn test_write_lock_shared_across_clones() {
        let store = MemoryElementStore::new();
        let other = store.clone();
        let id = Uuid::new_v4();

        assert!(Arc::ptr_eq(&store.write_lock(id), &other.write_lock(id)));
        assert!(!Arc::ptr_eq(
            &store.write_lock(id),
            &store.write_lock(Uuid::new_v4())
        ));

        let lock = store.write_lock(id);
        let _guard = lock.lock().await;
        assert!(other.write_lock(id).try_lock().is_err());
    }
}
