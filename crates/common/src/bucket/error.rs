use std::fmt::{self, Display};

use uuid::Uuid;

use crate::access::AccessError;
use crate::crypto::PublicKey;
use crate::element_store::ElementStoreError;

use super::config::ConfigError;
use super::types::{ContentHash, ElementId, ElementKind, RedundancyLevel};

/// Names the input array of a batch call that failed a shape check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchArray {
    Metas,
    Datas,
    Containers,
    Parents,
    PrevMetas,
    NewMetas,
    PrevDatas,
    NewDatas,
    PrevContainers,
    NewContainers,
}

impl Display for BatchArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchArray::Metas => "metas",
            BatchArray::Datas => "datas",
            BatchArray::Containers => "containers",
            BatchArray::Parents => "parents",
            BatchArray::PrevMetas => "prev metas",
            BatchArray::NewMetas => "new metas",
            BatchArray::PrevDatas => "prev datas",
            BatchArray::NewDatas => "new datas",
            BatchArray::PrevContainers => "prev containers",
            BatchArray::NewContainers => "new containers",
        };
        f.write_str(name)
    }
}

/// Every way a bucket call can be rejected.
///
/// A call that returns any of these has left the store untouched.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    #[error("element store error: {0}")]
    Store(anyhow::Error),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("bucket {0} not found")]
    BucketNotFound(Uuid),
    #[error("bucket {0} already exists")]
    BucketExists(Uuid),
    #[error("bucket is closed")]
    Closed,

    // shape
    #[error("invalid {0} length")]
    LengthMismatch(BatchArray),
    #[error("invalid {kind} hash {hash:?}")]
    InvalidHash { kind: ElementKind, hash: ContentHash },
    #[error("invalid key input")]
    InvalidKeyInput,

    // resources
    #[error("workload too high: {requested} exceeds ceiling of {ceiling}")]
    WorkloadExceeded { requested: usize, ceiling: usize },

    // keys
    #[error("no key available for {account} in epoch {epoch}")]
    NoKeyAvailable { account: PublicKey, epoch: u64 },
    #[error("block number {height} before genesis {genesis}")]
    BeforeGenesis { height: u64, genesis: u64 },
    #[error("block number {height} in future, current is {current}")]
    InFuture { height: u64, current: u64 },
    #[error("key already available for {account} in epoch {epoch}")]
    KeyAlreadyAvailable { account: PublicKey, epoch: u64 },

    // existence
    #[error("{kind} {hash} not found")]
    NotFound { kind: ElementKind, hash: ContentHash },
    #[error("parent {0} not found")]
    ParentNotFound(ElementId),
    #[error("parent {0} is not a container")]
    ParentNotContainer(ElementId),
    #[error("only callable from registered element, {0} is not registered")]
    UnregisteredElement(ElementId),

    // uniqueness / versions
    #[error("{kind} {hash} already exists")]
    HashExists { kind: ElementKind, hash: ContentHash },
    #[error("older version already superseded: {kind} {hash}")]
    AlreadySuperseded { kind: ElementKind, hash: ContentHash },
    #[error("new version collides with an existing older version: {kind} {hash}")]
    CollidesWithOlderVersion { kind: ElementKind, hash: ContentHash },
    #[error("newer version exists, cannot remove {kind} {hash}")]
    NewerVersionExists { kind: ElementKind, hash: ContentHash },

    // relationships
    #[error("{kind} {hash} is not a child of the stated parent")]
    NotChildOfParent { kind: ElementKind, hash: ContentHash },
    #[error("container {0} still has live children")]
    HasLiveChildren(ContentHash),
    #[error("setting parent {parent} on {element} would create a cycle")]
    CyclicParent { element: ElementId, parent: ElementId },

    // replication
    #[error("wrong redundancy level {level} on {element}, must be none")]
    WrongRedundancyLevel {
        element: ElementId,
        level: RedundancyLevel,
    },
}

impl<T: Display> From<ElementStoreError<T>> for BucketError {
    fn from(e: ElementStoreError<T>) -> Self {
        match e {
            ElementStoreError::BucketNotFound(id) => BucketError::BucketNotFound(id),
            other => BucketError::Store(anyhow::anyhow!("{}", other)),
        }
    }
}
